mod common;

use common::{leftover_scratch_dirs, noise, write_tar_gz, write_zip, Recorder};
use rasterfetch::{CancellationToken, ExtractStage, ItemError, PipelineEvent, Stage};
use std::path::PathBuf;
use tempfile::TempDir;

fn tif_extensions() -> Vec<String> {
    vec![".tif".to_string(), ".tiff".to_string()]
}

#[tokio::test]
async fn test_archive_without_payload_warns() {
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("12S45ZN.zip");
    let second = temp.path().join("13S45ZN.zip");
    write_zip(&first, &[("12S45ZN.tif", b"raster")]);
    write_zip(&second, &[("readme.txt", b"no rasters here")]);

    let recorder = Recorder::new();
    let outcome = ExtractStage::new(
        vec![first.clone(), second.clone()],
        temp.path(),
        tif_extensions(),
    )
    .run(&recorder)
    .await;

    assert_eq!(outcome.relocated, vec![temp.path().join("12S45ZN.tif")]);
    assert_eq!(outcome.processed, 2);
    assert!(!outcome.cancelled);
    assert_eq!(
        std::fs::read(temp.path().join("12S45ZN.tif")).unwrap(),
        b"raster"
    );

    let errors = recorder.errors(Stage::Extract);
    assert_eq!(errors, vec![ItemError::NoPayload { archive: second }]);
    assert!(errors[0].is_warning());
    assert!(leftover_scratch_dirs(temp.path()).is_empty());
}

#[tokio::test]
async fn test_corrupt_archive_does_not_stop_batch() {
    let temp = TempDir::new().unwrap();
    let broken = temp.path().join("broken.zip");
    let good = temp.path().join("good.zip");
    std::fs::write(&broken, b"<html>404 Not Found</html>").unwrap();
    write_zip(&good, &[("tiles/good.TIF", b"raster")]);

    let recorder = Recorder::new();
    let outcome = ExtractStage::new(vec![broken.clone(), good], temp.path(), tif_extensions())
        .run(&recorder)
        .await;

    assert_eq!(outcome.relocated, vec![temp.path().join("good.TIF")]);
    assert_eq!(outcome.processed, 2);

    let errors = recorder.errors(Stage::Extract);
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ItemError::CorruptArchive { archive, .. } => assert_eq!(archive, &broken),
        other => panic!("expected corrupt archive error, got {:?}", other),
    }
    assert!(errors[0].to_string().contains("broken.zip"));
    assert!(leftover_scratch_dirs(temp.path()).is_empty());
}

#[tokio::test]
async fn test_checksum_mismatch_is_corrupt_archive() {
    let temp = TempDir::new().unwrap();
    let damaged = temp.path().join("damaged.zip");
    let good = temp.path().join("good.zip");
    write_zip(&damaged, &[("12S45ZN.tif", b"elevation-samples-elevation-samples")]);
    write_zip(&good, &[("13S45ZN.tif", b"raster")]);

    let mut bytes = std::fs::read(&damaged).unwrap();
    let at = bytes
        .windows(17)
        .position(|w| w == b"elevation-samples")
        .unwrap();
    bytes[at + 3] ^= 0x01;
    std::fs::write(&damaged, bytes).unwrap();

    let recorder = Recorder::new();
    let outcome = ExtractStage::new(vec![damaged.clone(), good], temp.path(), tif_extensions())
        .run(&recorder)
        .await;

    assert_eq!(outcome.relocated, vec![temp.path().join("13S45ZN.tif")]);
    assert!(!temp.path().join("12S45ZN.tif").exists());
    assert!(matches!(
        recorder.errors(Stage::Extract).as_slice(),
        [ItemError::CorruptArchive { archive, .. }] if archive == &damaged
    ));
    assert!(leftover_scratch_dirs(temp.path()).is_empty());
}

#[tokio::test]
async fn test_truncated_tar_gz_is_corrupt_archive() {
    let temp = TempDir::new().unwrap();
    let cut = temp.path().join("cut.tar.gz");
    write_tar_gz(&cut, &[("a.tif", &noise(200 * 1024))]);
    let bytes = std::fs::read(&cut).unwrap();
    std::fs::write(&cut, &bytes[..bytes.len() / 2]).unwrap();

    let recorder = Recorder::new();
    let outcome = ExtractStage::new(vec![cut.clone()], temp.path(), tif_extensions())
        .run(&recorder)
        .await;

    assert!(outcome.relocated.is_empty());
    assert_eq!(outcome.processed, 1);
    assert!(matches!(
        recorder.errors(Stage::Extract).as_slice(),
        [ItemError::CorruptArchive { archive, .. }] if archive == &cut
    ));
    assert!(!temp.path().join("a.tif").exists());
    assert!(leftover_scratch_dirs(temp.path()).is_empty());
}

#[tokio::test]
async fn test_every_archive_advances_index_once() {
    let temp = TempDir::new().unwrap();
    let ok = temp.path().join("ok.zip");
    let empty = temp.path().join("empty.zip");
    let corrupt = temp.path().join("corrupt.zip");
    let absent = temp.path().join("absent.zip");
    write_zip(&ok, &[("a.tif", b"a")]);
    write_zip(&empty, &[("a.txt", b"a")]);
    std::fs::write(&corrupt, b"garbage").unwrap();

    let archives = vec![ok, empty, corrupt, absent.clone()];
    let recorder = Recorder::new();
    let outcome = ExtractStage::new(archives, temp.path(), tif_extensions())
        .run(&recorder)
        .await;

    assert_eq!(outcome.processed, 4);
    assert_eq!(recorder.started_indices(Stage::Extract), vec![0, 1, 2, 3]);

    let progress: Vec<_> = recorder
        .stage_events(Stage::Extract)
        .into_iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress { received, total } => Some((received, total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);

    let errors = recorder.errors(Stage::Extract);
    assert_eq!(errors.len(), 3);
    assert!(matches!(errors[0], ItemError::NoPayload { .. }));
    assert!(matches!(errors[1], ItemError::CorruptArchive { .. }));
    assert!(matches!(&errors[2], ItemError::Extraction { archive, .. } if archive == &absent));

    assert_eq!(
        recorder.count(Stage::Extract, |e| matches!(e, PipelineEvent::Finished { .. })),
        1
    );
}

#[tokio::test]
async fn test_same_named_payloads_are_disambiguated() {
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("first.zip");
    let second = temp.path().join("second.zip");
    write_zip(&first, &[("x.tif", b"one")]);
    write_zip(&second, &[("nested/x.tif", b"two")]);

    let outcome = ExtractStage::new(vec![first, second], temp.path(), tif_extensions())
        .run(&Recorder::new())
        .await;

    assert_eq!(
        outcome.relocated,
        vec![temp.path().join("x.tif"), temp.path().join("x_1.tif")]
    );
    assert_eq!(std::fs::read(temp.path().join("x.tif")).unwrap(), b"one");
    assert_eq!(std::fs::read(temp.path().join("x_1.tif")).unwrap(), b"two");
}

#[tokio::test]
async fn test_multiple_payloads_in_one_archive() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("multi.zip");
    write_zip(
        &archive,
        &[("a.tif", b"a"), ("b.tiff", b"b"), ("b.tif.aux.xml", b"meta")],
    );

    let outcome = ExtractStage::new(vec![archive], temp.path(), tif_extensions())
        .run(&Recorder::new())
        .await;

    assert_eq!(
        outcome.relocated,
        vec![temp.path().join("a.tif"), temp.path().join("b.tiff")]
    );
    assert!(!temp.path().join("b.tif.aux.xml").exists());
}

#[tokio::test]
async fn test_missing_work_dir_is_extraction_error() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("a.zip");
    write_zip(&archive, &[("a.tif", b"a")]);
    let work_dir: PathBuf = temp.path().join("does-not-exist");

    let recorder = Recorder::new();
    let outcome = ExtractStage::new(vec![archive], &work_dir, tif_extensions())
        .run(&recorder)
        .await;

    assert!(outcome.relocated.is_empty());
    assert_eq!(outcome.processed, 1);
    assert!(matches!(
        recorder.errors(Stage::Extract).as_slice(),
        [ItemError::Extraction { .. }]
    ));
}

#[tokio::test]
async fn test_cancel_stops_between_archives() {
    let temp = TempDir::new().unwrap();
    let mut archives = Vec::new();
    for name in ["a", "b", "c"] {
        let path = temp.path().join(format!("{}.zip", name));
        let payload = format!("{}.tif", name);
        write_zip(&path, &[(payload.as_str(), b"r")]);
        archives.push(path);
    }

    let token = CancellationToken::new();
    let hook_token = token.clone();
    let recorder = Recorder::with_hook(move |event| {
        if event.event == PipelineEvent::ItemFinished {
            hook_token.cancel();
        }
    });

    let outcome = ExtractStage::new(archives, temp.path(), tif_extensions())
        .with_cancel_token(token)
        .run(&recorder)
        .await;

    assert!(outcome.cancelled);
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.relocated, vec![temp.path().join("a.tif")]);
    assert_eq!(recorder.started_indices(Stage::Extract), vec![0]);
    assert!(recorder.stage_events(Stage::Extract).iter().any(|e| matches!(
        e,
        PipelineEvent::Started { message } if message.contains("2 archive(s) left unprocessed")
    )));
    assert!(matches!(
        recorder.stage_events(Stage::Extract).last(),
        Some(PipelineEvent::Finished { .. })
    ));
}
