use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::Result;

/// Reads a text corpus and returns its lines.
///
/// - Reads the entire file into memory
/// - Splits on `\n` / `\r\n`
pub fn read_file<P: AsRef<Path>>(filename: P) -> io::Result<Vec<String>> {
	let mut contents = String::new();
	File::open(filename)?.read_to_string(&mut contents)?;
	Ok(contents.lines().map(str::to_owned).collect())
}

/// Builds a path beside `input_path` with another extension.
///
/// Example:
/// `models/news.arpa` + `"bin"` → `models/news.bin`
pub fn build_output_path<P: AsRef<Path>>(input_path: P, output_extension: &str) -> io::Result<PathBuf> {
	let input_path = input_path.as_ref();

	let parent = input_path.parent().unwrap_or_else(|| Path::new("."));
	let file_stem = input_path
		.file_stem()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Input path has no filename"))?;

	let mut output = PathBuf::from(parent);
	output.push(file_stem);
	output.set_extension(output_extension);

	Ok(output)
}

/// Writes `bytes` to `path` through a temporary file in the same directory,
/// so readers never observe a half-written model.
pub(crate) fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
	let path = path.as_ref();
	let dir = match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent,
		_ => Path::new("."),
	};
	let mut file = NamedTempFile::new_in(dir)?;
	file.write_all(bytes)?;
	file.as_file().sync_all()?;
	file.persist(path).map_err(|err| err.error)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn output_path_swaps_extension() {
		let path = build_output_path("models/news.arpa", "bin").unwrap();
		assert_eq!(path, PathBuf::from("models/news.bin"));
		let path = build_output_path("news", "bin").unwrap();
		assert_eq!(path, PathBuf::from("news.bin"));
	}

	#[test]
	fn atomic_write_replaces_content() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out.txt");
		write_atomic(&path, b"first").unwrap();
		write_atomic(&path, b"second").unwrap();
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
		assert_eq!(read_file(&path).unwrap(), vec!["second".to_owned()]);
	}
}
