//! Stand-ins for the StarSpace `starspace` trainer and `embed_doc` embedder.
//!
//! [`FakeStarSpace`] writes two POSIX shell scripts into a temporary
//! directory. They follow the real tools' command-line contract closely
//! enough for the pipeline to run end to end without the C++ binaries:
//!
//! - the trainer parses `-trainFile` and `-model`, writes `<model>` and
//!   `<model>.tsv` (the configured items, one per row), and logs its runs
//! - the embedder reads one phrase from stdin, prints the banner lines the
//!   real tool prints, then the vector registered for that phrase (or a
//!   constant default vector)
//!
//! Marker words change behaviour:
//!
//! | marker        | where   | effect                      |
//! |---------------|---------|-----------------------------|
//! | `FAIL_TRAIN`  | corpus  | trainer exits 1             |
//! | `DELAY_TRAIN` | corpus  | trainer sleeps 1s           |
//! | `SLOW_TRAIN`  | corpus  | trainer becomes `sleep 30`  |
//! | `FAIL_EMBED`  | phrase  | embedder exits 3            |
//! | `SLOW_EMBED`  | phrase  | embedder becomes `sleep 30` |
//! | `STDERR_AFTER`| phrase  | stderr line after the vector |

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TRAINER: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$FAKE_DIR/train_args.log"
corpus=""
model=""
while [ $# -gt 0 ]; do
  case "$1" in
    -trainFile) corpus="$2"; shift 2 ;;
    -model) model="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "start $corpus" >> "$FAKE_DIR/train_runs.log"
if grep -q FAIL_TRAIN "$corpus"; then
  echo "fatal: corpus rejected" >&2
  echo "end $corpus" >> "$FAKE_DIR/train_runs.log"
  exit 1
fi
if grep -q DELAY_TRAIN "$corpus"; then sleep 1; fi
if grep -q SLOW_TRAIN "$corpus"; then exec sleep 30; fi
echo "Arguments:"
echo "lr: 0.01"
echo "Start to train the model"
echo "Epoch: 100.0%  lr: 0.000000  loss: 0.042"
echo "warning: fake trainer" >&2
echo "fake-model" > "$model"
cp "$FAKE_DIR/items.tsv" "$model.tsv"
echo "Saving model to file : $model"
echo "end $corpus" >> "$FAKE_DIR/train_runs.log"
"#;

const EMBEDDER: &str = r#"#!/bin/sh
if [ ! -f "$1" ]; then
  echo "cannot open model $1" >&2
  exit 2
fi
IFS= read -r phrase || true
printf '%s\n' "$phrase" >> "$FAKE_DIR/received.log"
case "$phrase" in
  *FAIL_EMBED*) echo "Start to load a trained starspace model."; echo "embed failure for input" >&2; exit 3 ;;
  *SLOW_EMBED*) exec sleep 30 ;;
esac
echo "Start to load a trained starspace model."
echo "STARSPACE-2018-2"
echo "Input your sentence / document now:"
vector=$(PHRASE="$phrase" awk -F '\t' '$1 == ENVIRON["PHRASE"] { print $2; exit }' "$FAKE_DIR/vectors.tsv")
if [ -z "$vector" ]; then vector="$DEFAULT_VECTOR"; fi
printf '%s\n\n' "$vector"
case "$phrase" in
  *STDERR_AFTER*) echo "Model unloaded, bye." >&2 ;;
esac
"#;

/// Temporary StarSpace installation backed by shell scripts.
pub struct FakeStarSpace {
    dir: TempDir,
    dim: usize,
}

impl FakeStarSpace {
    /// Install the scripts; unknown phrases embed to a constant vector of `dim` values.
    pub fn new(dim: usize) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create fake StarSpace dir");
        let root = dir.path();
        fs::create_dir_all(root.join("data")).expect("Failed to create data dir");
        fs::write(root.join("items.tsv"), "").expect("Failed to write items.tsv");
        fs::write(root.join("vectors.tsv"), "").expect("Failed to write vectors.tsv");

        let default_vector = vec!["0.5"; dim].join(" ");
        let prelude = format!(
            "FAKE_DIR='{}'\nDEFAULT_VECTOR='{}'\n",
            root.display(),
            default_vector
        );

        write_script(&root.join("starspace"), TRAINER, &prelude);
        write_script(&root.join("embed_doc"), EMBEDDER, &prelude);

        Self { dir, dim }
    }

    /// Add a catalog item emitted by the trainer with the vector the embedder returns for it.
    pub fn with_item(self, item: &str, vector: &[f32]) -> Self {
        let columns: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
        self.append("items.tsv", &format!("{}\t{}\n", item, columns.join("\t")));
        self.with_raw_output(item, &columns.join(" "))
    }

    /// Add a catalog item whose embedder output is `raw` verbatim.
    pub fn with_raw_item(self, item: &str, raw: &str) -> Self {
        self.append("items.tsv", &format!("{}\n", item));
        self.with_raw_output(item, raw)
    }

    /// Register the vector printed for a query phrase.
    pub fn with_phrase(self, phrase: &str, vector: &[f32]) -> Self {
        let columns: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
        self.with_raw_output(phrase, &columns.join(" "))
    }

    /// Register the exact last output line printed for `phrase`.
    pub fn with_raw_output(self, phrase: &str, raw: &str) -> Self {
        self.append("vectors.tsv", &format!("{}\t{}\n", phrase, raw));
        self
    }

    /// Write the model and item dump as if a training run had completed.
    pub fn install_model(&self) {
        fs::write(self.model_path(), "fake-model").expect("Failed to write model");
        fs::copy(self.path().join("items.tsv"), self.tsv_path()).expect("Failed to copy item dump");
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn trainer_path(&self) -> PathBuf {
        self.path().join("starspace")
    }

    pub fn embedder_path(&self) -> PathBuf {
        self.path().join("embed_doc")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.path().join("data")
    }

    pub fn model_path(&self) -> PathBuf {
        self.data_dir().join("model")
    }

    pub fn tsv_path(&self) -> PathBuf {
        self.data_dir().join("model.tsv")
    }

    /// Phrases the embedder has read from stdin, in call order.
    pub fn received_phrases(&self) -> Vec<String> {
        self.read_lines("received.log")
    }

    /// `start <corpus>` / `end <corpus>` markers of every trainer run.
    pub fn training_log(&self) -> Vec<String> {
        self.read_lines("train_runs.log")
    }

    /// Arguments of the most recent trainer invocation, one per entry.
    pub fn train_args(&self) -> Vec<String> {
        self.read_lines("train_args.log")
    }

    fn append(&self, file: &str, content: &str) {
        use std::io::Write;

        let mut handle = fs::OpenOptions::new()
            .append(true)
            .open(self.path().join(file))
            .expect("Failed to open fake StarSpace file");
        handle
            .write_all(content.as_bytes())
            .expect("Failed to append fake StarSpace file");
    }

    fn read_lines(&self, file: &str) -> Vec<String> {
        fs::read_to_string(self.path().join(file))
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

fn write_script(path: &Path, body: &str, prelude: &str) {
    let (shebang, rest) = body.split_once('\n').expect("script has a shebang line");
    fs::write(path, format!("{}\n{}{}", shebang, prelude, rest)).expect("Failed to write script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .expect("Failed to make script executable");
    }
}
