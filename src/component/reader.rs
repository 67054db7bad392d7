// src/component/reader.rs

//! Tab-separated corpus reader.
//!
//! One token per line, sentences separated by blank lines. The columns for
//! the word form and the tag come from the configured field map.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;

use crate::component::Node;
use crate::config::{ReaderConfig, FIELD_FORM, FIELD_TAG};
use crate::error::{LearnError, Result};

#[derive(Debug, Clone)]
pub struct TsvReader {
    form: usize,
    tag: usize,
}

impl TsvReader {
    pub fn new(form: usize, tag: usize) -> Self {
        Self { form, tag }
    }

    pub fn from_config(config: &ReaderConfig) -> Result<Self> {
        let column = |field: &str| {
            config
                .fields
                .get(field)
                .copied()
                .ok_or_else(|| LearnError::Config(format!("reader field map lacks '{}'", field)))
        };
        Ok(Self::new(column(FIELD_FORM)?, column(FIELD_TAG)?))
    }

    /// Reads every sentence from `input`.
    ///
    /// A missing form column is a format error; a missing or `_` tag column
    /// leaves the token without a gold tag.
    pub fn read<R: BufRead>(&self, input: R) -> Result<Vec<Vec<Node>>> {
        let mut sentences = Vec::new();
        let mut current = Vec::new();

        for (line_no, line) in input.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                if !current.is_empty() {
                    sentences.push(std::mem::take(&mut current));
                }
                continue;
            }

            let columns: Vec<&str> = line.split('\t').collect();
            let form = columns.get(self.form).ok_or_else(|| {
                LearnError::Format(format!(
                    "line {}: no form column {} in '{}'",
                    line_no + 1,
                    self.form,
                    line
                ))
            })?;
            let gold = columns
                .get(self.tag)
                .filter(|t| **t != "_")
                .map(|t| t.to_string());
            current.push(Node::new(*form, gold));
        }

        if !current.is_empty() {
            sentences.push(current);
        }
        Ok(sentences)
    }

    pub fn read_file(&self, path: &Path) -> Result<Vec<Vec<Node>>> {
        let sentences = self.read(BufReader::new(File::open(path)?))?;
        debug!("Read {} sentences from {}", sentences.len(), path.display());
        Ok(sentences)
    }

    /// Reads every matching file under `path` as one document.
    pub fn read_documents(&self, path: &Path, ext: &str) -> Result<Vec<Vec<Vec<Node>>>> {
        let files = file_list(path, ext)?;
        if files.is_empty() {
            return Err(LearnError::Config(format!(
                "no '{}' files under {}",
                ext,
                path.display()
            )));
        }
        files.iter().map(|f| self.read_file(f)).collect()
    }
}

/// Files under `path` with extension `ext`, sorted. `*` matches any file; a
/// plain file path is returned as is.
pub fn file_list(path: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?.path();
        if !entry.is_file() {
            continue;
        }
        let matches = ext == "*" || entry.extension().is_some_and(|e| e == ext);
        if matches {
            files.push(entry);
        }
    }
    files.sort();
    Ok(files)
}
