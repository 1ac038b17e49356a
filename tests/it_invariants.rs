//! End-to-end scenarios and quantified invariants for the display index,
//! checked against ground truth derived from the raw line widths.

use logloglog::format::node::LEAF_FANOUT;
use logloglog::{default_width, rows, Error, LogLogLog, Options};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

struct Fixture {
    tmp: TempDir,
    source: PathBuf,
}

impl Fixture {
    fn new(name: &str, content: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join(name);
        fs::write(&source, content).unwrap();
        Self { tmp, source }
    }

    fn cache_root(&self) -> PathBuf {
        self.tmp.path().join("cache")
    }

    fn open(&self) -> LogLogLog {
        LogLogLog::open_with(&self.source, Options::default().cache_dir(self.cache_root()))
            .unwrap()
    }

    fn append_raw(&self, bytes: &[u8]) {
        let mut f = OpenOptions::new().append(true).open(&self.source).unwrap();
        f.write_all(bytes).unwrap();
    }

    /// The single cache directory for a source basename.
    fn cache_dir_of(&self, basename: &str) -> PathBuf {
        let mut dirs: Vec<PathBuf> = fs::read_dir(self.cache_root())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with(&format!("{basename}."))
            })
            .collect();
        assert_eq!(dirs.len(), 1, "expected one cache dir for {basename}");
        dirs.pop().unwrap()
    }
}

/// Check the index against ground truth from the expected per-line widths:
/// exact row totals at every queried width, locate/row_of duality, and
/// strictly increasing line start rows.
fn verify_invariants(log: &LogLogLog, widths: &[u16], query_widths: &[u16]) {
    assert_eq!(log.len(), widths.len() as u64);
    for (i, &w) in widths.iter().enumerate() {
        if i % 97 == 0 || i == widths.len() - 1 {
            assert_eq!(log.width_of(i as u64).unwrap(), w, "width_of({i})");
        }
    }

    for &qw in query_widths {
        let total: u64 = widths.iter().map(|&w| rows(w, qw)).sum();
        assert_eq!(log.rows_at(qw).unwrap(), total, "rows_at({qw})");
        if total == 0 {
            continue;
        }

        // locate/row_of duality on sampled rows.
        let step = (total / 64).max(1);
        for r in (0..total).step_by(step as usize).chain([total - 1]) {
            let (line, residual) = log.locate(qw, r).unwrap();
            let start = log.row_of(qw, line).unwrap();
            let line_rows = rows(widths[line as usize], qw);
            assert!(start <= r && r < start + line_rows, "locate({qw}, {r})");
            assert_eq!(residual, r - start, "residual of locate({qw}, {r})");
        }

        // row_of is strictly increasing in the line number.
        let line_step = (widths.len() / 64).max(1);
        let mut prev = None;
        for line in (0..widths.len() as u64).step_by(line_step) {
            let row = log.row_of(qw, line).unwrap();
            if let Some(p) = prev {
                assert!(row > p, "row_of({qw}) not increasing at line {line}");
            }
            prev = Some(row);
        }

        assert!(matches!(
            log.locate(qw, total),
            Err(Error::OutOfRange { .. })
        ));
    }
}

#[test]
fn empty_log() {
    let fx = Fixture::new("empty.log", "");
    let log = fx.open();
    assert_eq!(log.len(), 0);
    assert_eq!(log.rows_at(80).unwrap(), 0);
    assert!(matches!(
        log.locate(80, 0),
        Err(Error::OutOfRange { index: 0, len: 0 })
    ));
    let view = log.at(80, 0, None).unwrap();
    assert!(view.is_empty());
    assert_eq!(view.iter().count(), 0);
}

#[test]
fn single_empty_line() {
    let fx = Fixture::new("one.log", "\n");
    let log = fx.open();
    assert_eq!(log.len(), 1);
    assert_eq!(log.width_of(0).unwrap(), 0);
    assert_eq!(log.rows_at(80).unwrap(), 1);
    assert_eq!(log.locate(80, 0).unwrap(), (0, 0));
    let view = log.at(80, 0, None).unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view.get(0).unwrap(), "");
}

#[test]
fn three_lines_at_two_widths() {
    let content = format!("{}\n{}\n{}\n", "a".repeat(10), "b".repeat(80), "c".repeat(160));
    let fx = Fixture::new("three.log", &content);
    let log = fx.open();
    assert_eq!(log.len(), 3);

    // W = 80: 1 + 1 + 2 rows.
    assert_eq!(log.rows_at(80).unwrap(), 4);
    assert_eq!(log.locate(80, 0).unwrap(), (0, 0));
    assert_eq!(log.locate(80, 1).unwrap(), (1, 0));
    assert_eq!(log.locate(80, 2).unwrap(), (2, 0));
    assert_eq!(log.locate(80, 3).unwrap(), (2, 1));

    // W = 40: 1 + 2 + 4 rows.
    assert_eq!(log.rows_at(40).unwrap(), 7);
    assert_eq!(log.locate(40, 5).unwrap(), (2, 2));

    // Display content of the wrapped rows.
    let view = log.at(80, 0, None).unwrap();
    assert_eq!(view.get(0).unwrap(), "a".repeat(10));
    assert_eq!(view.get(2).unwrap(), "c".repeat(80));
    assert_eq!(view.get(3).unwrap(), "c".repeat(80));
    let narrow = log.at(40, 0, None).unwrap();
    assert_eq!(narrow.get(1).unwrap(), "b".repeat(40));
    assert_eq!(narrow.get(2).unwrap(), "b".repeat(40));

    // Windowed views clamp to the total.
    let window = log.at(40, 2, Some(100)).unwrap();
    assert_eq!(window.len(), 5);
    assert_eq!(window.get(0).unwrap(), "b".repeat(40));
    assert_eq!(window.row_of_line(2).unwrap(), 1);
    assert!(window.row_of_line(0).is_err());
}

#[test]
fn leaf_seal_spills_into_a_second_level() {
    let n = LEAF_FANOUT + 1;
    let content = "x\n".repeat(n);
    let fx = Fixture::new("seal.log", &content);
    let log = fx.open();
    assert_eq!(log.len(), n as u64);
    for qw in [1u16, 80, u16::MAX] {
        assert_eq!(log.rows_at(qw).unwrap(), n as u64);
        assert_eq!(log.row_of(qw, n as u64 - 1).unwrap(), n as u64 - 1);
    }
    let widths = vec![1u16; n];
    verify_invariants(&log, &widths, &[1, 80]);
}

#[test]
fn append_then_reopen() {
    let fx = Fixture::new("grow.log", "");
    let mut rng = StdRng::seed_from_u64(42);
    let lines: Vec<String> = (0..10_000)
        .map(|_| "y".repeat(rng.gen_range(0..300)))
        .collect();
    let widths: Vec<u16> = lines.iter().map(|l| default_width(l)).collect();

    {
        let mut log = fx.open();
        for line in &lines {
            log.append(line).unwrap();
        }
        verify_invariants(&log, &widths, &[1, 40, 80, 200]);
        log.close().unwrap();
    }

    let log = fx.open();
    verify_invariants(&log, &widths, &[1, 3, 40, 80, 200]);
    assert_eq!(log.get(0).unwrap(), lines[0]);
    assert_eq!(log.get(9_999).unwrap(), lines[9_999]);
}

#[test]
fn trailing_partial_line_waits_for_terminator() {
    let fx = Fixture::new("partial.log", "abc\ndef");
    let mut log = fx.open();
    assert_eq!(log.len(), 1);
    assert_eq!(log.get(0).unwrap(), "abc");

    // The terminator arrives along with more bytes; the partial line is
    // indexed whole, never split.
    fx.append_raw(b"ghi\n");
    log.update().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log.get(1).unwrap(), "defghi");
}

#[test]
fn incremental_equivalence() {
    let mut rng = StdRng::seed_from_u64(7);
    let content: String = (0..5_000)
        .map(|_| format!("{}\n", "z".repeat(rng.gen_range(0..250))))
        .collect();

    // One-shot baseline.
    let whole = Fixture::new("whole.log", &content);
    whole.open().close().unwrap();

    // Same bytes in arbitrary chunks (splitting lines mid-way), with an
    // update between chunks.
    let chunked = Fixture::new("chunked.log", "");
    {
        let mut log = chunked.open();
        let bytes = content.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            let n = rng.gen_range(1..7_000).min(bytes.len() - pos);
            chunked.append_raw(&bytes[pos..pos + n]);
            pos += n;
            log.update().unwrap();
        }
        log.close().unwrap();
    }

    let whole_dir = whole.cache_dir_of("whole.log");
    let chunked_dir = chunked.cache_dir_of("chunked.log");
    for file in ["widths.dat", "nodes.dat"] {
        assert_eq!(
            fs::read(whole_dir.join(file)).unwrap(),
            fs::read(chunked_dir.join(file)).unwrap(),
            "{file} differs between one-shot and chunked indexing"
        );
    }
}

#[test]
fn rotation_rebuilds_fresh() {
    let fx = Fixture::new("rot.log", "one\ntwo\nthree\n");
    {
        let log = fx.open();
        assert_eq!(log.len(), 3);
        log.close().unwrap();
    }

    // Replace the file: new inode, new ctime, new content.
    fs::remove_file(&fx.source).unwrap();
    fs::write(&fx.source, "alpha\nbeta\n").unwrap();
    let log = fx.open();
    assert_eq!(log.len(), 2);
    assert_eq!(log.get(0).unwrap(), "alpha");
    verify_invariants(&log, &[5, 4], &[1, 3, 80]);
}

#[test]
fn truncation_rebuilds() {
    let fx = Fixture::new("trunc.log", "aaaa\nbbbb\ncccc\n");
    {
        let log = fx.open();
        assert_eq!(log.len(), 3);
        log.close().unwrap();
    }

    // Shrink in place (same inode).
    let f = OpenOptions::new().write(true).open(&fx.source).unwrap();
    f.set_len(5).unwrap();
    drop(f);
    let log = fx.open();
    assert_eq!(log.len(), 1);
    assert_eq!(log.get(0).unwrap(), "aaaa");
}

#[test]
fn midsession_rotation_detected_on_update() {
    let fx = Fixture::new("swap.log", "first\nsecond\n");
    let mut log = fx.open();
    assert_eq!(log.len(), 2);

    // Swap in a different file at the same path while the index is open.
    let replacement = fx.tmp.path().join("replacement");
    fs::write(&replacement, "other\n").unwrap();
    fs::rename(&replacement, &fx.source).unwrap();
    log.update().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log.get(0).unwrap(), "other");
}

#[test]
fn tail_rows_returns_last_rows() {
    let content = format!("{}\n{}\n", "a".repeat(100), "b".repeat(10));
    let fx = Fixture::new("tail.log", &content);
    let log = fx.open();
    // At width 40: 3 rows of a's, then 1 row of b's.
    let tail = log.tail_rows(40, 2).unwrap();
    assert_eq!(tail, vec!["a".repeat(20), "b".repeat(10)]);
    // Asking for more rows than exist returns everything.
    assert_eq!(log.tail_rows(40, 100).unwrap().len(), 4);
}

/// Unicode widths flow through the whole stack: a CJK line is twice as
/// wide as its char count and wraps accordingly.
#[test]
fn unicode_widths_end_to_end() {
    let line = "漢".repeat(30); // 60 cells
    let fx = Fixture::new("uni.log", &format!("{line}\nascii\n"));
    let log = fx.open();
    assert_eq!(log.width_of(0).unwrap(), 60);
    assert_eq!(log.rows_at(40).unwrap(), 3);
    let view = log.at(40, 0, None).unwrap();
    assert_eq!(view.get(0).unwrap(), "漢".repeat(20));
    assert_eq!(view.get(1).unwrap(), "漢".repeat(10));
    assert_eq!(view.get(2).unwrap(), "ascii");
}

/// The fingerprinted cache directory contains exactly the expected files.
#[test]
fn cache_layout() {
    let fx = Fixture::new("layout.log", "hello\n");
    fx.open().close().unwrap();
    let dir = fx.cache_dir_of("layout.log");
    for file in ["widths.dat", "positions.dat", "nodes.dat", "metadata"] {
        assert!(dir.join(file).exists(), "{file} missing");
    }
    // widths.dat is trimmed to exactly one u16 per line on close.
    assert_eq!(fs::metadata(dir.join("widths.dat")).unwrap().len(), 2);
    assert_eq!(fs::metadata(dir.join("positions.dat")).unwrap().len(), 8);
}

fn _assert_send(_: impl Send) {}

#[test]
fn index_is_send() {
    let fx = Fixture::new("send.log", "x\n");
    _assert_send(fx.open());
}
