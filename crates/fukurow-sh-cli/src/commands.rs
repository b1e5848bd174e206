//! CLI command definitions and handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fukurow_sh::{
    read_goals, write_goal_report, AxiomLoader, FunctionalSyntaxLoader, HierarchyFormatter,
    ReasonerConfig, ShReasoner,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main CLI structure
#[derive(Parser)]
#[command(name = "fukurow-sh")]
#[command(about = "Consequence-based classifier for SH ontologies")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Classify an ontology in functional syntax
    Classify {
        /// Ontology file (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Goal file: one query per line, class names separated by spaces
        #[arg(short, long)]
        goals: Option<PathBuf>,

        /// Classify without writing results
        #[arg(short = 'n', long)]
        no_output: bool,

        /// Output format
        #[arg(short, long, default_value = "owl")]
        format: OutputFormat,

        /// Reasoner configuration as JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Disable forward subset elimination
        #[arg(long)]
        no_subset: bool,

        /// Evict accepted clauses subsumed by new ones
        #[arg(long)]
        backward_subsumption: bool,

        /// Share one Top context per role across goals
        #[arg(long)]
        top_sharing: bool,

        /// Redirect successors of contexts with universals to private secondary contexts
        #[arg(long)]
        secondary_contexts: bool,
    },

    /// Show version and default configuration
    Info,
}

/// Output format options
#[derive(Clone, Debug, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    Owl,
    Json,
    JsonPretty,
}

/// Command execution result
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Options of one `classify` run
#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub goals: Option<PathBuf>,
    pub no_output: bool,
    pub format: Option<OutputFormat>,
    pub config: Option<PathBuf>,
    pub no_subset: bool,
    pub backward_subsumption: bool,
    pub top_sharing: bool,
    pub secondary_contexts: bool,
}

/// Execute CLI commands
#[derive(Default)]
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute a CLI command
    pub fn execute(&mut self, command: Commands) -> Result<CommandResult> {
        match command {
            Commands::Classify {
                input,
                output,
                goals,
                no_output,
                format,
                config,
                no_subset,
                backward_subsumption,
                top_sharing,
                secondary_contexts,
            } => self.execute_classify(ClassifyOptions {
                input,
                output,
                goals,
                no_output,
                format: Some(format),
                config,
                no_subset,
                backward_subsumption,
                top_sharing,
                secondary_contexts,
            }),
            Commands::Info => self.execute_info(),
        }
    }

    fn reasoner_config(options: &ClassifyOptions) -> Result<ReasonerConfig> {
        let mut config = match &options.config {
            Some(path) => ReasonerConfig::from_json_file(path)
                .with_context(|| format!("failed to read configuration {}", path.display()))?,
            None => ReasonerConfig::default(),
        };
        if options.no_subset {
            config.subset_elimination = false;
        }
        if options.backward_subsumption {
            config.backward_subsumption = true;
        }
        if options.top_sharing {
            config.top_sharing = true;
        }
        if options.secondary_contexts {
            config.secondary_contexts = true;
        }
        Ok(config)
    }

    fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
        Ok(match path {
            Some(path) => Box::new(BufReader::new(
                File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
            )),
            None => Box::new(BufReader::new(io::stdin())),
        })
    }

    fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
        Ok(match path {
            Some(path) => Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
            )),
            None => Box::new(BufWriter::new(io::stdout())),
        })
    }

    pub fn execute_classify(&mut self, options: ClassifyOptions) -> Result<CommandResult> {
        let config = Self::reasoner_config(&options)?;
        let mut reasoner = ShReasoner::new(config);

        let report = FunctionalSyntaxLoader::new()
            .load(Self::open_input(options.input.as_deref())?, &mut reasoner)?;

        let goal_mode = options.goals.is_some();
        let classification = match &options.goals {
            Some(path) => {
                let goals = read_goals(Self::open_input(Some(path.as_path()))?, &mut reasoner)?;
                reasoner.classify_goals(&goals)?
            }
            None => reasoner.classify()?,
        };
        info!("{} goals classified", classification.goals.len());

        let summary = serde_json::json!({
            "axioms": report.axioms,
            "skipped": report.skipped,
            "unsupported": report.unsupported,
            "goals": classification.goals.len(),
            "consistent": classification.consistent,
            "stats": classification.stats,
        });

        if !options.no_output {
            let terms = reasoner.terms();
            let mut out = Self::open_output(options.output.as_deref())?;
            match options.format.unwrap_or(OutputFormat::Owl) {
                OutputFormat::Owl if goal_mode => write_goal_report(&classification, terms, &mut out)?,
                OutputFormat::Owl => {
                    let mut formatter = HierarchyFormatter::new(terms.atomics_ordered());
                    classification.feed(terms, &mut formatter)?;
                    formatter.write(terms, &mut out)?;
                }
                OutputFormat::Json => {
                    serde_json::to_writer(&mut out, &classification.report(terms))?;
                    writeln!(out)?;
                }
                OutputFormat::JsonPretty => {
                    serde_json::to_writer_pretty(&mut out, &classification.report(terms))?;
                    writeln!(out)?;
                }
            }
            out.flush()?;
        }

        Ok(CommandResult {
            success: true,
            message: format!(
                "Classified {} goals from {} axioms{}",
                classification.goals.len(),
                report.axioms,
                if classification.consistent { "" } else { " (ontology is inconsistent)" }
            ),
            data: Some(summary),
        })
    }

    fn execute_info(&self) -> Result<CommandResult> {
        let config = ReasonerConfig::default();
        println!("Fukurow SH Classifier");
        println!("Version: {}", env!("CARGO_PKG_VERSION"));
        println!("Default configuration:");
        println!("{}", serde_json::to_string_pretty(&config)?);

        Ok(CommandResult {
            success: true,
            message: "System information displayed".to_string(),
            data: Some(serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config": config,
            })),
        })
    }
}
