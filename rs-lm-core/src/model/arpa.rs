use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::{debug, warn};

use super::ngram_model::{LOG_ZERO, LogP, Model};
use crate::error::{LmError, Result};
use crate::io::write_atomic;
use crate::vocab::{SpecialTokens, Vocabulary, WordIndex};

#[derive(Clone, Copy)]
enum Section {
	Preamble,
	Data,
	Ngrams(usize),
	End,
}

/// Parses `\k-grams:` into `k`.
fn section_order(line: &str) -> Option<usize> {
	line.strip_prefix('\\')?.strip_suffix("-grams:")?.parse().ok()
}

fn parse_logp(field: &str, origin: &str, line: usize) -> Result<LogP> {
	let value: f64 = field
		.parse()
		.map_err(|_| LmError::parse(origin, line, format!("invalid number `{field}`")))?;
	if value.is_nan() {
		return Err(LmError::parse(origin, line, "probability is NaN"));
	}
	Ok(value.max(LOG_ZERO))
}

impl Model {
	/// Reads a model in ARPA text format.
	///
	/// ```text
	/// \data\
	/// ngram 1=3
	/// ngram 2=1
	///
	/// \1-grams:
	/// -0.5	a	-0.3
	/// ...
	/// \end\
	/// ```
	///
	/// # Parameters
	/// - `origin`: name used in error messages (usually the file name).
	///
	/// # Behavior
	/// - Text before `\data\` and blank lines are ignored.
	/// - `-inf` and values below [`LOG_ZERO`] are stored as `LOG_ZERO`.
	/// - A section whose entry count differs from its header is accepted with
	///   a warning.
	///
	/// # Errors
	/// `ParseError` with the line number for a malformed header, entry or
	/// section, or a missing `\data\` / `\end\`.
	pub fn read_arpa<R: BufRead>(reader: R, origin: &str) -> Result<Self> {
		let mut section = Section::Preamble;
		let mut declared: Vec<usize> = Vec::new();
		let mut found: Vec<usize> = Vec::new();
		let mut model: Option<Model> = None;
		let mut last_line = 0;
		let mut ngram: Vec<WordIndex> = Vec::new();

		for (number, line) in reader.lines().enumerate() {
			let line = line?;
			let line_no = number + 1;
			last_line = line_no;
			let trimmed = line.trim();
			if trimmed.is_empty() {
				continue;
			}

			match section {
				Section::Preamble => {
					if trimmed == "\\data\\" {
						section = Section::Data;
					}
				}
				Section::Data => {
					if let Some(spec) = trimmed.strip_prefix("ngram ") {
						let (k, n) = spec
							.split_once('=')
							.and_then(|(k, n)| Some((k.trim().parse::<usize>().ok()?, n.trim().parse::<usize>().ok()?)))
							.ok_or_else(|| LmError::parse(origin, line_no, format!("malformed header `{trimmed}`")))?;
						if k != declared.len() + 1 {
							return Err(LmError::parse(origin, line_no, format!("expected ngram {}=, got {k}=", declared.len() + 1)));
						}
						declared.push(n);
					} else if let Some(k) = section_order(trimmed) {
						if declared.is_empty() {
							return Err(LmError::parse(origin, line_no, "no `ngram k=n` header lines"));
						}
						model = Some(Model::new(declared.len(), Vocabulary::new(SpecialTokens::default(), false))?);
						found = vec![0; declared.len()];
						section = Self::enter_section(k, declared.len(), origin, line_no)?;
					} else {
						return Err(LmError::parse(origin, line_no, format!("unexpected line in header `{trimmed}`")));
					}
				}
				Section::Ngrams(k) => {
					if trimmed == "\\end\\" {
						section = Section::End;
						break;
					}
					if let Some(next) = section_order(trimmed) {
						section = Self::enter_section(next, declared.len(), origin, line_no)?;
						continue;
					}
					let Some(model) = model.as_mut() else {
						return Err(LmError::parse(origin, line_no, "n-gram entry before any section"));
					};

					let fields: Vec<&str> = trimmed.split_whitespace().collect();
					let max_fields = if k < declared.len() { k + 2 } else { k + 1 };
					if fields.len() != k + 1 && fields.len() != max_fields {
						return Err(LmError::parse(
							origin,
							line_no,
							format!("expected {k} words in a {k}-gram entry, got {} fields", fields.len()),
						));
					}
					let logp = parse_logp(fields[0], origin, line_no)?;
					ngram.clear();
					for word in &fields[1..=k] {
						ngram.push(model.vocabulary_mut().add(word));
					}
					model.set_prob(&ngram, logp);
					if let Some(bow) = fields.get(k + 1) {
						let bow = parse_logp(bow, origin, line_no)?;
						model.set_backoff_weight(&ngram, bow);
					}
					found[k - 1] += 1;
				}
				Section::End => break,
			}
		}

		match section {
			Section::End => {}
			Section::Preamble => return Err(LmError::parse(origin, last_line, "missing \\data\\ section")),
			_ => return Err(LmError::parse(origin, last_line, "missing \\end\\ marker")),
		}
		let model = model.ok_or_else(|| LmError::parse(origin, last_line, "no n-gram sections"))?;

		for (k, (want, got)) in declared.iter().zip(&found).enumerate() {
			if want != got {
				warn!("{origin}: header announces {want} {}-grams, found {got}", k + 1);
			}
		}
		debug!("{origin}: loaded order {} model, {} words", model.order(), model.vocabulary_size());
		Ok(model)
	}

	fn enter_section(k: usize, order: usize, origin: &str, line: usize) -> Result<Section> {
		if k == 0 || k > order {
			return Err(LmError::parse(origin, line, format!("{k}-grams section in an order {order} model")));
		}
		Ok(Section::Ngrams(k))
	}

	/// Opens and parses an ARPA file. Errors are tagged with the file name.
	pub fn load_arpa<P: AsRef<Path>>(path: P) -> Result<Self> {
		let origin = path.as_ref().display().to_string();
		let reader = BufReader::new(File::open(&path)?);
		Self::read_arpa(reader, &origin)
	}

	/// Writes the model in ARPA text format.
	///
	/// Entries are sorted by word index within each order. Every order below
	/// the maximum carries a backoff column, `0` where the context has no
	/// stored weight.
	pub fn write_arpa<W: Write>(&self, writer: W) -> Result<()> {
		let mut writer = BufWriter::new(writer);
		writeln!(writer, "\\data\\")?;
		for k in 1..=self.order() {
			writeln!(writer, "ngram {k}={}", self.ngram_count(k))?;
		}

		for k in 1..=self.order() {
			writeln!(writer)?;
			writeln!(writer, "\\{k}-grams:")?;
			for (ngram, logp) in self.ngrams(k) {
				let words = ngram
					.iter()
					.map(|&w| self.vocabulary().word_of(w))
					.collect::<Result<Vec<&str>>>()?;
				write!(writer, "{logp:.7}\t{}", words.join(" "))?;
				if k < self.order() {
					write!(writer, "\t{:.7}", self.backoff_weight(&ngram))?;
				}
				writeln!(writer)?;
			}
		}

		writeln!(writer)?;
		writeln!(writer, "\\end\\")?;
		writer.flush()?;
		Ok(())
	}

	/// Saves the model as an ARPA file, replacing `path` atomically.
	pub fn save_arpa<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		let mut buffer = Vec::new();
		self.write_arpa(&mut buffer)?;
		write_atomic(path, &buffer)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SMALL: &str = "some preamble\n\n\\data\\\nngram 1=4\nngram 2=2\n\n\\1-grams:\n-99\t<s>\t-0.2\n-0.5\ta\t-0.3\n-0.6\tb\n-0.4\t</s>\n\n\\2-grams:\n-0.1\t<s> a\n-0.2\ta b\n\n\\end\\\n";

	#[test]
	fn reads_entries_and_weights() {
		let model = Model::read_arpa(SMALL.as_bytes(), "small").unwrap();
		let vocab = model.vocabulary();
		let a = vocab.index_of("a");
		let b = vocab.index_of("b");
		assert_eq!(model.order(), 2);
		assert_eq!(model.ngram_prob(&[a, b]), Some(-0.2));
		assert_eq!(model.backoff_weight(&[a]), -0.3);
		assert!((model.score(&[a], a) - (-0.8)).abs() < 1e-12);
	}

	#[test]
	fn write_then_read_is_stable() {
		let model = Model::read_arpa(SMALL.as_bytes(), "small").unwrap();
		let mut first = Vec::new();
		model.write_arpa(&mut first).unwrap();
		let again = Model::read_arpa(first.as_slice(), "again").unwrap();
		let mut second = Vec::new();
		again.write_arpa(&mut second).unwrap();
		assert_eq!(String::from_utf8(first).unwrap(), String::from_utf8(second).unwrap());
	}

	#[test]
	fn count_mismatch_is_not_fatal() {
		let text = SMALL.replace("ngram 2=2", "ngram 2=7");
		assert!(Model::read_arpa(text.as_bytes(), "small").is_ok());
	}

	#[test]
	fn errors_carry_origin_and_line() {
		let text = SMALL.replace("-0.2\ta b", "oops\ta b");
		match Model::read_arpa(text.as_bytes(), "bad.arpa").unwrap_err() {
			LmError::ParseError { origin, line, .. } => {
				assert_eq!(origin, "bad.arpa");
				assert_eq!(line, 15);
			}
			other => panic!("unexpected error {other:?}"),
		}

		let truncated = SMALL.replace("\\end\\", "");
		assert!(matches!(
			Model::read_arpa(truncated.as_bytes(), "t"),
			Err(LmError::ParseError { .. })
		));
		let too_many = SMALL.replace("-0.2\ta b", "-0.2\ta b -1 x");
		assert!(Model::read_arpa(too_many.as_bytes(), "t").is_err());
	}
}
