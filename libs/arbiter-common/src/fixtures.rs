//! Content-addressable fixture storage and bulk import pairing.
//!
//! Fixture bytes live under `<root>/<first two hex chars>/<sha256>`. Test
//! cases only record the relative path, so identical fixtures are stored once
//! and a stored path never changes meaning.

use crate::error::FixtureError;
use crate::types::{Problem, TestCase};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

pub const INPUT_EXTENSIONS: &[&str] = &["in", "inp", "input", "txt"];
pub const OUTPUT_EXTENSIONS: &[&str] = &["ans", "out", "answer", "expected", "txt"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureRef {
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
}

impl FixtureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a stored relative path to a file under the root
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, FixtureError> {
        let rel = Path::new(relative);
        let clean = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if relative.is_empty() || !clean {
            return Err(FixtureError::InvalidPath(relative.to_string()));
        }
        Ok(self.root.join(rel))
    }

    pub async fn put(&self, bytes: &[u8]) -> Result<FixtureRef, FixtureError> {
        let digest = hex::encode(Sha256::digest(bytes));
        let relative = format!("{}/{}", &digest[..2], digest);
        let target = self.root.join(&relative);

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(path = %relative, "Fixture already stored");
            return Ok(FixtureRef {
                path: relative,
                size: bytes.len() as u64,
            });
        }

        let dir = self.root.join(&digest[..2]);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FixtureError::io(&dir, e))?;

        // Write under a unique name, then rename into place
        let staging = dir.join(format!(".{}.{}", digest, uuid::Uuid::new_v4()));
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|e| FixtureError::io(&staging, e))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| FixtureError::io(&target, e))?;

        Ok(FixtureRef {
            path: relative,
            size: bytes.len() as u64,
        })
    }

    pub async fn put_file(&self, source: &Path) -> Result<FixtureRef, FixtureError> {
        let bytes = tokio::fs::read(source)
            .await
            .map_err(|e| FixtureError::io(source, e))?;
        self.put(&bytes).await
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, FixtureError> {
        let path = self.resolve(relative)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| FixtureError::io(&path, e))
    }

    /// Read a fixture, treating any failure as an empty fixture
    pub async fn read_or_empty(&self, relative: &str) -> Vec<u8> {
        match self.read(relative).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(fixture = relative, error = %e, "Unreadable fixture, using empty content");
                Vec::new()
            }
        }
    }
}

/// Input/output files discovered by a bulk import scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixturePair {
    pub stem: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub input_size: u64,
    pub output_size: u64,
}

impl FixturePair {
    pub fn input_name(&self) -> String {
        file_name(&self.input)
    }

    pub fn output_name(&self) -> String {
        file_name(&self.output)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Recursively list regular files below `dir`, sorted by path
pub fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>, FixtureError> {
    let meta = fs::metadata(dir).map_err(|e| FixtureError::io(dir, e))?;
    if !meta.is_dir() {
        return Err(FixtureError::NotADirectory(dir.display().to_string()));
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current).map_err(|e| FixtureError::io(&current, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| FixtureError::io(&current, e))?;
            let file_type = entry.file_type().map_err(|e| FixtureError::io(entry.path(), e))?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

fn split_name(path: &Path) -> Option<(String, String)> {
    let stem = path.file_stem()?.to_string_lossy().into_owned();
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    Some((stem, ext))
}

/// Numeric stems sort numerically ahead of everything else
fn stem_order(stem: &str) -> (u8, u64, String) {
    match stem.parse::<u64>() {
        Ok(n) => (0, n, stem.to_string()),
        Err(_) => (1, 0, stem.to_string()),
    }
}

/// Pair files by filename stem. Every input is paired with the first output
/// sharing its stem; a file is never paired with itself.
pub fn match_pairs(files: &[PathBuf]) -> Vec<(String, PathBuf, PathBuf)> {
    let mut by_stem: BTreeMap<(u8, u64, String), (String, Vec<PathBuf>, Vec<PathBuf>)> =
        BTreeMap::new();

    for file in files {
        let Some((stem, ext)) = split_name(file) else {
            continue;
        };
        let entry = by_stem
            .entry(stem_order(&stem))
            .or_insert_with(|| (stem.clone(), Vec::new(), Vec::new()));
        if INPUT_EXTENSIONS.contains(&ext.as_str()) {
            entry.1.push(file.clone());
        }
        if OUTPUT_EXTENSIONS.contains(&ext.as_str()) {
            entry.2.push(file.clone());
        }
    }

    let mut pairs = Vec::new();
    for (stem, inputs, outputs) in by_stem.into_values() {
        for input in &inputs {
            if let Some(output) = outputs.iter().find(|o| *o != input) {
                pairs.push((stem.clone(), input.clone(), output.clone()));
            }
        }
    }
    pairs
}

/// Scan a directory and build the import preview. Pairs whose files cannot
/// be stat'ed are skipped.
pub fn preview(dir: &Path) -> Result<Vec<FixturePair>, FixtureError> {
    let files = scan_dir(dir)?;
    let mut items = Vec::new();
    for (stem, input, output) in match_pairs(&files) {
        let sizes = fs::metadata(&input).and_then(|i| fs::metadata(&output).map(|o| (i.len(), o.len())));
        match sizes {
            Ok((input_size, output_size)) => items.push(FixturePair {
                stem,
                input,
                output,
                input_size,
                output_size,
            }),
            Err(e) => warn!(stem = %stem, error = %e, "Skipping fixture pair"),
        }
    }
    Ok(items)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub failed: usize,
}

/// Copy previewed pairs into the store and append them to the problem's test cases
pub async fn import_pairs(
    store: &FixtureStore,
    problem: &mut Problem,
    pairs: &[FixturePair],
) -> ImportSummary {
    let mut summary = ImportSummary::default();
    for pair in pairs {
        let stored = async {
            let input = store.put_file(&pair.input).await?;
            let output = store.put_file(&pair.output).await?;
            Ok::<_, FixtureError>((input, output))
        }
        .await;

        match stored {
            Ok((input, output)) => {
                let ordinal = problem.next_ordinal();
                problem.test_cases.push(TestCase {
                    ordinal,
                    input_path: input.path,
                    output_path: output.path,
                    input_name: pair.input_name(),
                    output_name: pair.output_name(),
                    input_size: input.size,
                    output_size: output.size,
                });
                summary.imported += 1;
            }
            Err(e) => {
                warn!(stem = %pair.stem, error = %e, "Import item failed");
                summary.failed += 1;
            }
        }
    }
    summary
}
