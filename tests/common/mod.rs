#![allow(dead_code)]

use rasterfetch::{EventSink, ItemError, PipelineEvent, Stage, StageEvent};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Hook = Box<dyn Fn(&StageEvent) + Send + Sync>;

/// Sink that records every event and optionally runs a hook inline.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<StageEvent>>,
    hook: Option<Hook>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(hook: impl Fn(&StageEvent) + Send + Sync + 'static) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            hook: Some(Box::new(hook)),
        }
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn stage_events(&self, stage: Stage) -> Vec<PipelineEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.stage == stage)
            .map(|e| e.event)
            .collect()
    }

    pub fn errors(&self, stage: Stage) -> Vec<ItemError> {
        self.stage_events(stage)
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Error(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, stage: Stage, matches: impl Fn(&PipelineEvent) -> bool) -> usize {
        self.stage_events(stage).iter().filter(|e| matches(e)).count()
    }

    pub fn started_indices(&self, stage: Stage) -> Vec<usize> {
        self.stage_events(stage)
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::ItemStarted { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for Recorder {
    fn emit(&self, event: StageEvent) {
        if let Some(hook) = &self.hook {
            hook(&event);
        }
        self.events.lock().unwrap().push(event);
    }
}

/// Writes a stored (uncompressed) ZIP archive holding `files`.
pub fn write_zip(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

/// Writes a gzip-compressed tar archive holding `files`.
pub fn write_tar_gz(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// `len` bytes that do not compress, from a fixed xorshift seed.
pub fn noise(len: usize) -> Vec<u8> {
    let mut seed = 0x9e37_79b9u32;
    (0..len)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed as u8
        })
        .collect()
}

/// Names of every entry directly inside `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Returns the bytes of a ZIP archive holding `files`.
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("archive.zip");
    write_zip(&path, files);
    std::fs::read(path).unwrap()
}

/// Serves `body` with status 200 at `route`.
pub async fn mount_body(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// Serves `status` with an empty body at `route`.
pub async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Names of entries directly inside `dir` that look like extraction scratch
/// directories.
pub fn leftover_scratch_dirs(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".extract-"))
        .collect()
}
