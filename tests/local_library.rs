use futures::StreamExt;
use image::{GenericImageView, RgbaImage};
use photo_loader::platform::local::{CODE_NOT_FOUND, CODE_UNSUPPORTED};
use photo_loader::platform::{AssetSourceType, PhotoPlatform, PlaybackStyle, PlatformAsset, Size};
use photo_loader::{LoaderError, LocalLibrary, PhotoAsset, PhotoAssetType, PhotoLoader};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

fn write_png(path: &Path, width: u32, height: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbaImage::new(width, height).save(path).unwrap();
}

fn fixture() -> TempDir {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write_png(&root.join("a.png"), 64, 48);
    write_png(&root.join("Favorites").join("f.png"), 8, 8);
    write_png(&root.join("Trip").join("t1.png"), 8, 8);
    write_png(&root.join("Trip").join("day2").join("t2.png"), 8, 8);
    fs::write(root.join("Trip").join("clip.mp4"), b"not really a movie").unwrap();
    write_png(&root.join(".cache").join("skip.png"), 8, 8);
    fs::write(root.join("notes.txt"), b"x").unwrap();
    tmp
}

fn open(root: &Path, watch: bool) -> Arc<dyn PhotoPlatform> {
    Arc::new(
        LocalLibrary::open(root)
            .unwrap()
            .with_change_watching(watch),
    )
}

fn album_ids(loader: &PhotoLoader, index: usize) -> Vec<String> {
    let album = loader.items_for_album(index).unwrap();
    let mut ids: Vec<String> = album.assets().iter().map(|a| a.id().to_owned()).collect();
    ids.sort();
    ids
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn directories_map_to_recents_favorites_and_albums() {
    let tmp = fixture();
    let loader = PhotoLoader::new(open(tmp.path(), false));

    let count = loader.number_of_albums().next().await.unwrap().unwrap();
    assert_eq!(count, 3);

    let titles: Vec<String> = (0..count)
        .map(|i| loader.items_for_album(i).unwrap().album_title().to_owned())
        .collect();
    assert_eq!(titles, vec!["Recents", "Favorites", "Trip"]);

    assert_eq!(
        album_ids(&loader, 0),
        vec![
            "Favorites/f.png",
            "Trip/clip.mp4",
            "Trip/day2/t2.png",
            "Trip/t1.png",
            "a.png"
        ]
    );
    assert_eq!(album_ids(&loader, 1), vec!["Favorites/f.png"]);
    assert_eq!(
        album_ids(&loader, 2),
        vec!["Trip/clip.mp4", "Trip/day2/t2.png", "Trip/t1.png"]
    );

    let trip = loader.items_for_album(2).unwrap();
    let kinds: Vec<PhotoAssetType> = trip.assets().iter().map(PhotoAsset::asset_type).collect();
    assert_eq!(kinds.iter().filter(|k| **k == PhotoAssetType::Video).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn library_without_favorites_has_no_favorites_album() {
    let tmp = tempdir().unwrap();
    write_png(&tmp.path().join("only.png"), 4, 4);
    let loader = PhotoLoader::new(open(tmp.path(), false));

    assert_eq!(loader.number_of_albums().next().await.unwrap().unwrap(), 1);
    let recents = loader.items_for_album(0).unwrap();
    assert_eq!(recents.images_count(), 1);
    let asset = recents.asset(0).await.unwrap();
    assert_eq!(asset.id(), "only.png");
    assert_eq!(asset.pixel_size(), (4, 4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn thumbnail_sends_preview_then_fill_cropped_final() {
    let tmp = fixture();
    let platform = open(tmp.path(), false);
    let loader = PhotoLoader::new(Arc::clone(&platform));
    let asset = loader
        .items_for_album(0)
        .unwrap()
        .assets()
        .into_iter()
        .find(|a| a.id() == "a.png")
        .unwrap();

    let thumbs: Vec<_> = asset.thumb_image(Size::new(16.0, 16.0)).collect().await;
    let sizes: Vec<(u32, u32)> = thumbs
        .into_iter()
        .map(|t| t.unwrap().unwrap().dimensions())
        .collect();
    assert_eq!(sizes, vec![(4, 4), (16, 16)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn original_image_reads_with_progress() {
    let tmp = fixture();
    let platform = open(tmp.path(), false);
    let loader = PhotoLoader::new(Arc::clone(&platform));
    let asset = loader
        .items_for_album(0)
        .unwrap()
        .assets()
        .into_iter()
        .find(|a| a.id() == "a.png")
        .unwrap();

    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&progress);
    let image = tokio::time::timeout(
        Duration::from_secs(5),
        asset
            .original_image(move |p| seen.lock().unwrap().push(p))
            .next(),
    )
    .await
    .expect("timeout waiting for original")
    .unwrap()
    .unwrap()
    .unwrap();

    assert_eq!(image.dimensions(), (64, 48));
    let progress = progress.lock().unwrap();
    assert_eq!(progress.last().copied(), Some(1.0));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn video_frames_are_unsupported() {
    let tmp = fixture();
    let platform = open(tmp.path(), false);
    let clip = PlatformAsset {
        local_identifier: "Trip/clip.mp4".to_owned(),
        pixel_width: 0,
        pixel_height: 0,
        playback_style: PlaybackStyle::Video,
        creation_date: None,
        source_type: AssetSourceType::UserLibrary,
        duration: None,
    };
    let asset = PhotoAsset::new(platform, Arc::new(clip));

    let video = asset.video_asset().next().await.unwrap().unwrap();
    assert!(video.is_some());

    let thumb = asset.generate_video_thumb().next().await.unwrap().unwrap();
    assert!(thumb.is_none());

    match asset.thumb_image(Size::new(8.0, 8.0)).next().await {
        Some(Err(LoaderError::Platform(err))) => assert_eq!(err.code, CODE_UNSUPPORTED),
        other => panic!("expected unsupported error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn identifiers_cannot_escape_the_root() {
    let tmp = tempdir().unwrap();
    let lib = tmp.path().join("lib");
    write_png(&lib.join("inside.png"), 4, 4);
    write_png(&tmp.path().join("secret.png"), 4, 4);
    let platform = open(&lib, false);

    for id in ["../secret.png", "/etc/passwd", ""] {
        let asset = PhotoAsset::new(
            Arc::clone(&platform),
            Arc::new(PlatformAsset {
                local_identifier: id.to_owned(),
                pixel_width: 4,
                pixel_height: 4,
                playback_style: PlaybackStyle::Image,
                creation_date: None,
                source_type: AssetSourceType::UserLibrary,
                duration: None,
            }),
        );
        match asset.original_image(|_| {}).next().await {
            Some(Err(LoaderError::Platform(err))) => assert_eq!(err.code, CODE_NOT_FOUND, "{id}"),
            other => panic!("expected not-found for {id:?}, got {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_album_directory_refreshes_the_count() {
    let tmp = fixture();
    let loader = PhotoLoader::new(open(tmp.path(), true));
    let mut counts = loader.number_of_albums();
    assert_eq!(counts.next().await.unwrap().unwrap(), 3);

    write_png(&tmp.path().join("Party").join("p.png"), 4, 4);

    loop {
        let count = tokio::time::timeout(Duration::from_secs(5), counts.next())
            .await
            .expect("timeout waiting for refreshed album count")
            .unwrap()
            .unwrap();
        if count == 4 {
            break;
        }
    }
}
