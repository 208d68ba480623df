use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};

use rs_lm_core::io::read_file;
use rs_lm_core::model::stats::text_stats;
use rs_lm_core::model::{Mixture, SentenceGenerator};
use rs_lm_core::{BoundaryPolicy, BuildConfig, DiscountMethod, Model, NgramCounts, OrderConfig, Vocabulary};

#[derive(Parser, Debug)]
#[command(name = "rs-lm")]
#[command(about = "Build, query and evaluate back-off n-gram language models")]
#[command(version)]
struct Args {
    /// Load ARPA models through a `.bin` cache stored beside them
    #[arg(long, global = true)]
    cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count a corpus and estimate a model
    Build(BuildArgs),

    /// Print the log10 probability of a word after a history
    Score {
        /// Model file (.arpa or .bin)
        #[arg(long)]
        lm: PathBuf,
        /// Preceding words, space separated
        #[arg(long, default_value = "")]
        history: String,
        word: String,
    },

    /// Compute log probability and perplexity of a text
    Ppl {
        #[arg(long)]
        lm: PathBuf,
        /// Text to score, one sentence per line
        #[arg(long)]
        text: PathBuf,
        /// Extra models interpolated with the main one
        #[arg(long)]
        mix_lm: Vec<PathBuf>,
        /// Mixture weights, main model first (uniform if omitted)
        #[arg(long)]
        lambda: Vec<f64>,
        /// Do not add sentence boundary tokens
        #[arg(long)]
        no_boundaries: bool,
    },

    /// Generate random sentences
    Generate {
        #[arg(long)]
        lm: PathBuf,
        #[arg(long, default_value_t = 10)]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = SentenceGenerator::MAX_LENGTH)]
        max_length: usize,
    },

    /// Convert a model between ARPA (.arpa) and binary (.bin)
    Convert { input: PathBuf, output: PathBuf },
}

#[derive(clap::Args, Debug)]
struct BuildArgs {
    /// Training text, one sentence per line
    #[arg(long)]
    text: Option<PathBuf>,
    /// Count files (`words<TAB>count`) to add to the text counts
    #[arg(long)]
    read_counts: Vec<PathBuf>,
    /// Write the merged counts here before estimation
    #[arg(long)]
    write_counts: Option<PathBuf>,
    /// JSON build configuration; overrides the estimation flags below
    #[arg(long)]
    config: Option<PathBuf>,
    /// Closed vocabulary file; other words are counted as <unk>
    #[arg(long)]
    vocab: Option<PathBuf>,

    #[arg(long, default_value_t = 3)]
    order: usize,
    #[arg(long, value_enum, default_value_t = Method::WittenBell)]
    discount: Method,
    /// Discount used when the data cannot support --discount
    #[arg(long, value_enum)]
    fallback: Option<Method>,
    /// Good-Turing cutoff (required by good-turing)
    #[arg(long)]
    gt_max: Option<u64>,
    /// Additive smoothing increment
    #[arg(long, default_value_t = 1.0)]
    delta: f64,
    /// Constant absolute discount
    #[arg(long, default_value_t = 0.5)]
    cdiscount: f64,
    /// Minimum count kept for bigrams and above
    #[arg(long, default_value_t = 1)]
    min_count: u64,
    #[arg(long)]
    interpolate: bool,
    #[arg(long)]
    no_boundaries: bool,
    #[arg(long)]
    lowercase: bool,

    /// Output model (.bin for binary, ARPA otherwise)
    #[arg(long)]
    lm: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Method {
    Additive,
    GoodTuring,
    WittenBell,
    Linear,
    Constant,
    KneserNey,
    ModifiedKneserNey,
    Natural,
}

impl BuildArgs {
    fn discount_method(&self, method: Method) -> Result<DiscountMethod, Box<dyn Error>> {
        Ok(match method {
            Method::Additive => DiscountMethod::Additive { delta: self.delta },
            Method::GoodTuring => DiscountMethod::GoodTuring {
                max_count: self.gt_max.ok_or("good-turing needs --gt-max")?,
            },
            Method::WittenBell => DiscountMethod::WittenBell,
            Method::Linear => DiscountMethod::Linear,
            Method::Constant => DiscountMethod::Constant { discount: self.cdiscount },
            Method::KneserNey => DiscountMethod::KneserNey { modified: false },
            Method::ModifiedKneserNey => DiscountMethod::KneserNey { modified: true },
            Method::Natural => DiscountMethod::Natural,
        })
    }

    fn build_config(&self) -> Result<BuildConfig, Box<dyn Error>> {
        if let Some(path) = &self.config {
            let mut config = BuildConfig::from_json_file(path)?;
            config.closed_vocabulary |= self.vocab.is_some();
            return Ok(config);
        }

        let discount = self.discount_method(self.discount)?;
        let fallback = self.fallback.map(|m| self.discount_method(m)).transpose()?;
        let orders = (1..=self.order)
            .map(|k| OrderConfig {
                discount: discount.clone(),
                fallback: fallback.clone(),
                min_count: if k == 1 { 1 } else { self.min_count },
                interpolate: self.interpolate,
            })
            .collect();
        let boundaries = if self.no_boundaries { BoundaryPolicy::Exclude } else { BoundaryPolicy::Include };

        let config = BuildConfig {
            orders,
            ..BuildConfig::new(self.order, discount)
        }
        .with_boundaries(boundaries)
        .with_closed_vocabulary(self.vocab.is_some())
        .with_lowercase(self.lowercase);
        config.validate()?;
        Ok(config)
    }
}

fn load_model(path: &Path, cache: bool) -> Result<Model, Box<dyn Error>> {
    let model = if path.extension().is_some_and(|ext| ext == "bin") {
        Model::load_binary(path)?
    } else if cache {
        Model::load_cached(path)?
    } else {
        Model::load_arpa(path)?
    };
    info!("loaded {}: order {}, {} words", path.display(), model.order(), model.vocabulary_size());
    Ok(model)
}

fn save_model(model: &Model, path: &Path) -> Result<(), Box<dyn Error>> {
    if path.extension().is_some_and(|ext| ext == "bin") {
        model.save_binary(path)?;
    } else {
        model.save_arpa(path)?;
    }
    info!("wrote {}", path.display());
    Ok(())
}

fn build(args: &BuildArgs) -> Result<(), Box<dyn Error>> {
    let config = args.build_config()?;

    let mut vocab = Vocabulary::new(config.specials.clone(), config.lowercase);
    if let Some(path) = &args.vocab {
        for line in read_file(path)? {
            for word in line.split_whitespace() {
                vocab.add(word);
            }
        }
    }

    let mut counts = NgramCounts::new(config.order, vocab, config.boundaries, config.closed_vocabulary)?;
    if let Some(path) = &args.text {
        let lines = read_file(path)?;
        info!("counting {} lines of {}", lines.len(), path.display());
        counts.count_parallel(&lines)?;
    }
    for path in &args.read_counts {
        let reader = BufReader::new(File::open(path)?);
        counts.read_counts(reader, &path.display().to_string())?;
    }
    if args.text.is_none() && args.read_counts.is_empty() {
        warn!("no --text or --read-counts given, estimating from empty counts");
    }
    if let Some(path) = &args.write_counts {
        counts.write_counts(BufWriter::new(File::create(path)?))?;
    }

    let outcome = counts.estimate(&config, None)?;
    let report = &outcome.report;
    for fallback in &report.fallbacks {
        println!("order {}: {} replaced by {} ({})", fallback.order, fallback.from, fallback.to, fallback.reason);
    }
    if report.degenerate_contexts > 0 {
        println!("{} contexts received a neutral backoff weight", report.degenerate_contexts);
    }
    for (k, n) in report.ngrams.iter().enumerate() {
        println!("{}-grams: {n}", k + 1);
    }
    save_model(&outcome.model, &args.lm)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    match &args.command {
        Command::Build(build_args) => build(build_args)?,

        Command::Score { lm, history, word } => {
            let model = load_model(lm, args.cache)?;
            let history: Vec<&str> = history.split_whitespace().collect();
            println!("{}", model.score_words(&history, word));
        }

        Command::Ppl { lm, text, mix_lm, lambda, no_boundaries } => {
            let boundaries = if *no_boundaries { BoundaryPolicy::Exclude } else { BoundaryPolicy::Include };
            let lines = read_file(text)?;
            let model = load_model(lm, args.cache)?;

            let stats = if mix_lm.is_empty() {
                model.text_stats(&lines, boundaries)
            } else {
                let mut models = vec![model];
                for path in mix_lm {
                    models.push(load_model(path, args.cache)?);
                }
                let weights = if lambda.is_empty() {
                    vec![1.0; models.len()]
                } else if lambda.len() == models.len() {
                    lambda.clone()
                } else {
                    return Err(format!("{} weights given for {} models", lambda.len(), models.len()).into());
                };
                let mixture = Mixture::new(models.into_iter().zip(weights).collect())?;
                text_stats(&mixture, &lines, boundaries)
            };
            println!("{stats}");
        }

        Command::Generate { lm, count, seed, max_length } => {
            let model = load_model(lm, args.cache)?;
            let mut generator = match seed {
                Some(seed) => SentenceGenerator::seeded(&model, *seed),
                None => SentenceGenerator::new(&model),
            }
            .with_max_length(*max_length);
            for _ in 0..*count {
                println!("{}", generator.sentence()?.join(" "));
            }
        }

        Command::Convert { input, output } => {
            let model = load_model(input, args.cache)?;
            save_model(&model, output)?;
        }
    }

    Ok(())
}
