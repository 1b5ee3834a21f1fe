// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

//! Reading lists of sizes from files.

use anyhow::Context;
use std::fs;
use std::io;
use std::path::Path;

/// Reads a list of sizes from `path`, or from standard input if `path` is `-`.
pub(crate) fn read_sizes(path: &Path) -> anyhow::Result<Vec<usize>> {
    let text = if path == Path::new("-") {
        io::read_to_string(io::stdin()).context("cannot read standard input")?
    } else {
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?
    };
    parse_sizes(&text).with_context(|| format!("invalid sizes in {}", path.display()))
}

/// Parses sizes separated by whitespace or commas. `#` starts a comment that runs to the end of
/// the line.
pub(crate) fn parse_sizes(text: &str) -> anyhow::Result<Vec<usize>> {
    let mut sizes = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.split_once('#').map_or(line, |(content, _)| content);
        let tokens = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty());
        for token in tokens {
            let size = token
                .parse()
                .with_context(|| format!("line {}: `{token}` is not a size", number + 1))?;
            sizes.push(size);
        }
    }
    Ok(sizes)
}
