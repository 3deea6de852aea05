mod support;

use std::sync::Arc;

use futures::StreamExt;
use postergen::application::download::{DownloadService, PdfDownload};
use postergen::domain::types::PosterStatus;
use uuid::Uuid;

use support::{MemoryStore, RecordingMerger, RecordingStore};

struct Fixture {
    store: Arc<MemoryStore>,
    remote: Arc<RecordingStore>,
    merger: Arc<RecordingMerger>,
    service: DownloadService,
}

fn fixture(keeps_remote: bool, fail: bool) -> Fixture {
    let store = MemoryStore::new();
    let remote = Arc::new(RecordingStore {
        keeps_remote,
        ..Default::default()
    });
    let merger = Arc::new(RecordingMerger {
        fail,
        ..Default::default()
    });
    let service = DownloadService::new(store.clone(), store.clone(), remote.clone(), merger.clone());
    Fixture {
        store,
        remote,
        merger,
        service,
    }
}

async fn drain(download: PdfDownload) -> (String, bool) {
    let mut body = String::new();
    let mut failed = false;
    let mut stream = download.stream;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => body.push_str(&String::from_utf8_lossy(&bytes)),
            Err(_) => failed = true,
        }
    }
    (body, failed)
}

#[tokio::test]
async fn build_download_merges_ready_posters_in_order() {
    let fixture = fixture(true, false);
    let build = fixture.store.seed_build("Kamppi");
    let first = fixture.store.seed_poster(build.id, PosterStatus::Ready);
    fixture.store.seed_poster(build.id, PosterStatus::Failed);
    fixture.store.seed_poster(build.id, PosterStatus::Pending);
    let last = fixture.store.seed_poster(build.id, PosterStatus::Ready);

    let download = fixture
        .service
        .download_build(build.id)
        .await
        .expect("download");

    assert_eq!(download.file_name, format!("Kamppi-{}.pdf", build.id));
    assert_eq!(download.poster_ids, vec![first.id, last.id]);
    assert_eq!(
        *fixture.remote.downloaded.lock().unwrap(),
        vec![vec![first.id, last.id]]
    );
    assert!(fixture.merger.removed.lock().unwrap().is_empty());

    let (body, failed) = drain(download).await;

    assert!(!failed);
    assert_eq!(body, format!("{};{};", first.id, last.id));
    assert_eq!(
        *fixture.merger.concatenated.lock().unwrap(),
        vec![vec![first.id, last.id]]
    );
    assert_eq!(*fixture.merger.removed.lock().unwrap(), vec![first.id, last.id]);
}

#[tokio::test]
async fn local_copies_stay_without_remote_store() {
    let fixture = fixture(false, false);
    let build = fixture.store.seed_build("Pasila");
    fixture.store.seed_poster(build.id, PosterStatus::Ready);

    let download = fixture
        .service
        .download_build(build.id)
        .await
        .expect("download");
    drain(download).await;

    assert!(fixture.merger.removed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_merge_keeps_local_copies() {
    let fixture = fixture(true, true);
    let build = fixture.store.seed_build("Kallio");
    fixture.store.seed_poster(build.id, PosterStatus::Ready);

    let download = fixture
        .service
        .download_build(build.id)
        .await
        .expect("download");
    let (_, failed) = drain(download).await;

    assert!(failed);
    assert!(fixture.merger.removed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn build_without_ready_posters_merges_nothing() {
    let fixture = fixture(true, false);
    let build = fixture.store.seed_build("Vallila");
    fixture.store.seed_poster(build.id, PosterStatus::Failed);

    let download = fixture
        .service
        .download_build(build.id)
        .await
        .expect("download");

    assert!(download.poster_ids.is_empty());
    let (body, failed) = drain(download).await;
    assert!(body.is_empty());
    assert!(!failed);
}

#[tokio::test]
async fn poster_download_is_named_after_its_configuration() {
    let fixture = fixture(true, false);
    let build = fixture.store.seed_build("Töölö");
    let poster = fixture.store.seed_poster(build.id, PosterStatus::Ready);

    let download = fixture
        .service
        .download_poster(poster.id)
        .await
        .expect("download");

    assert_eq!(download.file_name, "Kamppi.pdf");
    assert_eq!(download.poster_ids, vec![poster.id]);
}

#[tokio::test]
async fn unknown_build_is_not_found() {
    let fixture = fixture(true, false);

    let error = match fixture.service.download_build(Uuid::new_v4()).await {
        Ok(_) => panic!("download of unknown build should fail"),
        Err(error) => error,
    };

    assert!(error.is_not_found());
    assert!(fixture.remote.downloaded.lock().unwrap().is_empty());
}
