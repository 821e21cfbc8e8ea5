use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    Config, Element, ElementKind, Error, Phase, Result,
    adapter::{
        Codecs, Decoder, EmitStream, Emitter, Encoder, Output, OutputMetrics, OutputWriter,
        parse_header,
    },
    config::keys,
    driver::{WorkChunk, WorkChunkDriver, chunks},
    emit::Emitable,
};

/// Writes one line-delimited file per (kind, label, slot):
/// `{output.jsonl.path}/{vertices|edges}/{label}-{slot}.jsonl`.
///
/// Every file starts with the encoder's metadata line, if any. Writers append,
/// so a later phase adding vertices to a label keeps what earlier phases
/// wrote; only [`Output::drop_storage`] removes data.
///
/// Labels are percent-escaped in file names: ASCII alphanumerics, `-` and `_`
/// are kept, every other byte becomes `%XX`.
#[derive(Debug)]
pub struct JsonLinesOutput {
    root: PathBuf,
    slot: usize,
    encoder: Arc<dyn Encoder>,
    metrics: Arc<OutputMetrics>,
}

impl JsonLinesOutput {
    pub fn new(root: impl Into<PathBuf>, slot: usize, encoder: Arc<dyn Encoder>) -> Self {
        Self {
            root: root.into(),
            slot,
            encoder,
            metrics: Arc::default(),
        }
    }

    pub fn from_config(config: &Config, codecs: &Codecs) -> Result<Self> {
        let root = config.require(keys::OUTPUT_JSONL_PATH)?;
        let slot = config.parse_or(keys::PIPELINE_SLOT, 0)?;
        Ok(Self::new(root, slot, Arc::clone(&codecs.encoder)))
    }

    /// Path of the file holding elements of `kind` labelled `label`.
    pub fn file_path(&self, kind: ElementKind, label: &str) -> PathBuf {
        let label = escape_label(label);
        let dir = match kind {
            ElementKind::Vertex => "vertices",
            ElementKind::Edge => "edges",
        };
        self.root
            .join(dir)
            .join(format!("{label}-{}.jsonl", self.slot))
    }
}

impl Output for JsonLinesOutput {
    fn writer(&self, kind: ElementKind, label: &str) -> Result<Box<dyn OutputWriter>> {
        let path = self.file_path(kind, label);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        let existing = file.metadata().map_err(|e| Error::io(&path, e))?.len();
        tracing::debug!(path = %path.display(), existing, "Opened JSON lines writer");

        Ok(Box::new(JsonLinesWriter {
            file: BufWriter::new(file),
            path,
            encoder: Arc::clone(&self.encoder),
            metrics: Arc::clone(&self.metrics),
            header_written: existing > 0,
        }))
    }

    fn metrics(&self) -> BTreeMap<String, u64> {
        self.metrics.snapshot()
    }

    fn drop_storage(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                tracing::info!(path = %self.root.display(), "Dropped JSON lines storage");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&self.root, e)),
        }
        self.metrics.reset();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn escape_label(label: &str) -> String {
    let mut escaped = String::with_capacity(label.len());
    for byte in label.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            escaped.push(char::from(byte));
        } else {
            let _ = write!(escaped, "%{byte:02X}");
        }
    }
    escaped
}

struct JsonLinesWriter {
    file: BufWriter<File>,
    path: PathBuf,
    encoder: Arc<dyn Encoder>,
    metrics: Arc<OutputMetrics>,
    header_written: bool,
}

impl JsonLinesWriter {
    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, "{line}").map_err(|e| Error::io(&self.path, e))
    }
}

impl OutputWriter for JsonLinesWriter {
    fn write_to_output(&mut self, element: &Element) -> Result<()> {
        if !self.header_written {
            if let Some(header) = self.encoder.encode_item_metadata(element) {
                self.write_line(&header)?;
            }
            self.header_written = true;
        }
        let line = self.encoder.encode(element)?;
        self.write_line(&line)?;
        self.metrics.record(element.kind());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush().map_err(|e| Error::io(&self.path, e))
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.file
            .get_ref()
            .sync_all()
            .map_err(|e| Error::io(&self.path, e))
    }
}

/// Reads elements from line-delimited files.
///
/// Expects [`WorkChunk::File`] units (see the `directory` work driver). Each
/// file is read line by line; metadata lines are remembered and handed to the
/// decoder with every following record. Only elements of the phase's kind are
/// emitted.
#[derive(Debug)]
pub struct JsonLinesEmitter {
    decoder: Arc<dyn Decoder>,
}

impl JsonLinesEmitter {
    pub const fn new(decoder: Arc<dyn Decoder>) -> Self {
        Self { decoder }
    }

    pub fn from_config(_config: &Config, codecs: &Codecs) -> Self {
        Self::new(Arc::clone(&codecs.decoder))
    }

    fn read_file(&self, path: PathBuf, phase: Phase) -> EmitStream<'static> {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => return Box::new(core::iter::once(Err(Error::io(&path, e)))),
        };
        tracing::debug!(path = %path.display(), %phase, "Reading JSON lines file");
        Box::new(FileRecords {
            lines: BufReader::new(file).lines(),
            path,
            header: None,
            decoder: Arc::clone(&self.decoder),
            phase,
            done: false,
        })
    }
}

impl Emitter for JsonLinesEmitter {
    fn phases(&self) -> &[Phase] {
        &Phase::ALL
    }

    fn stream<'a>(&'a self, driver: &'a dyn WorkChunkDriver, phase: Phase) -> EmitStream<'a> {
        Box::new(chunks(driver).flat_map(move |chunk| -> EmitStream<'a> {
            match chunk {
                Ok(WorkChunk::File(path)) => self.read_file(path, phase),
                Ok(unit @ WorkChunk::Items(_)) => {
                    Box::new(core::iter::once(Err(Error::UnsupportedWork {
                        component: "jsonl emitter",
                        unit: unit.to_string(),
                    })))
                }
                Err(e) => Box::new(core::iter::once(Err(e))),
            }
        }))
    }
}

struct FileRecords {
    lines: std::io::Lines<BufReader<File>>,
    path: PathBuf,
    header: Option<String>,
    decoder: Arc<dyn Decoder>,
    phase: Phase,
    done: bool,
}

impl Iterator for FileRecords {
    type Item = Result<Box<dyn Emitable>>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::io(&self.path, e)));
                }
            };
            if parse_header(&line).is_ok() {
                self.header = Some(line);
                continue;
            }
            if self.decoder.skip_entry(&line) {
                continue;
            }
            match self
                .decoder
                .decode_element(&line, self.header.as_deref(), self.phase)
            {
                Ok(element) if element.kind() == self.phase.kind() => {
                    return Some(Ok(Box::new(element)));
                }
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Edge, Vertex,
        adapter::{JsonDecoder, JsonEncoder, SinkSession, VERTICES_WRITTEN},
        driver::{IteratorDriver, WorkItem, id::PassthroughIdDriver},
    };

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("graphmill-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn writes_a_header_then_one_line_per_element() {
        let root = scratch("jsonl-out");
        let output = Arc::new(JsonLinesOutput::new(&root, 3, Arc::new(JsonEncoder)));
        let mut session = SinkSession::new(output.clone(), Arc::new(PassthroughIdDriver));
        session.write(&mut Vertex::new(1, "person").into()).unwrap();
        session.write(&mut Vertex::new(2, "person").into()).unwrap();
        session.close().unwrap();

        let path = output.file_path(ElementKind::Vertex, "person");
        assert_eq!(path, root.join("vertices").join("person-3.jsonl"));
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "# vertex person");
        assert_eq!(lines.len(), 3);
        assert_eq!(output.metrics()[VERTICES_WRITTEN], 2);

        output.drop_storage().unwrap();
        assert!(!root.exists());
        output.drop_storage().unwrap();
    }

    #[test]
    fn later_sessions_append_without_repeating_the_header() {
        let root = scratch("jsonl-append");
        let output = Arc::new(JsonLinesOutput::new(&root, 0, Arc::new(JsonEncoder)));
        for id in [1, 2] {
            let mut session = SinkSession::new(output.clone(), Arc::new(PassthroughIdDriver));
            session.write(&mut Vertex::new(id, "person").into()).unwrap();
            session.close().unwrap();
        }

        let contents = fs::read_to_string(output.file_path(ElementKind::Vertex, "person")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "# vertex person");
        assert!(lines[1].contains("\"id\":1"));
        assert!(lines[2].contains("\"id\":2"));

        output.drop_storage().unwrap();
    }

    #[test]
    fn distinct_labels_get_distinct_files() {
        let output = JsonLinesOutput::new("/out", 1, Arc::new(JsonEncoder));
        let spaced = output.file_path(ElementKind::Edge, "a b");
        let underscored = output.file_path(ElementKind::Edge, "a_b");
        let escaped = output.file_path(ElementKind::Edge, "a%20b");

        assert_eq!(spaced, PathBuf::from("/out/edges/a%20b-1.jsonl"));
        assert_eq!(underscored, PathBuf::from("/out/edges/a_b-1.jsonl"));
        assert_eq!(escaped, PathBuf::from("/out/edges/a%2520b-1.jsonl"));
        assert_eq!(
            output.file_path(ElementKind::Vertex, "../x"),
            PathBuf::from("/out/vertices/%2E%2E%2Fx-1.jsonl")
        );
    }

    #[test]
    fn emitter_reads_files_and_keeps_the_phase_kind() {
        let root = scratch("jsonl-in");
        fs::create_dir_all(&root).unwrap();
        let path = root.join("mixed.jsonl");
        fs::write(
            &path,
            "# vertex person\n{\"id\":1}\n\n{\"id\":2}\n# edge knows\n{\"from\":1,\"to\":2}\n",
        )
        .unwrap();

        let emitter = JsonLinesEmitter::new(Arc::new(JsonDecoder));
        let driver = IteratorDriver::over([WorkChunk::File(path.clone())]);
        let vertices: Vec<String> = emitter
            .stream(&driver, Phase::One)
            .map(|e| format!("{:?}", e.unwrap()))
            .collect();
        assert_eq!(
            vertices,
            vec![
                format!("{:?}", Element::from(Vertex::new(1, "person"))),
                format!("{:?}", Element::from(Vertex::new(2, "person"))),
            ]
        );

        let driver = IteratorDriver::over([WorkChunk::File(path)]);
        let edges: Vec<String> = emitter
            .stream(&driver, Phase::Two)
            .map(|e| format!("{:?}", e.unwrap()))
            .collect();
        assert_eq!(edges, vec![format!("{:?}", Element::from(Edge::new("knows", 1, 2)))]);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn emitter_rejects_item_chunks_and_missing_files() {
        let emitter = JsonLinesEmitter::new(Arc::new(JsonDecoder));
        let driver = IteratorDriver::over([
            WorkChunk::Items(vec![WorkItem::Id(1)]),
            WorkChunk::File(PathBuf::from("/definitely/not/here.jsonl")),
        ]);
        let results: Vec<_> = emitter.stream(&driver, Phase::One).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(Error::UnsupportedWork { .. })));
        assert!(matches!(results[1], Err(Error::Io { .. })));
    }
}
