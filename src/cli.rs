//! Interface de linha de comando do LESSONFORGE baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (create, watch, status)
//! e flags globais (--base-url, --poll-interval-ms, --source, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use lessonforge::backend::{Difficulty, PollSource, Volume};

/// LESSONFORGE: cliente de geração de material didático com revisão humana.
#[derive(Debug, Parser)]
#[command(name = "lessonforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// URL base da API (sobrescreve `lessonforge.toml`).
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Intervalo entre consultas de status, em milissegundos.
    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    /// Endpoint consultado durante o polling.
    #[arg(long, global = true)]
    pub source: Option<SourceArg>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Nível de dificuldade aceito pela CLI, mapeado para [`Difficulty`] internamente.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DifficultyArg {
    Beginner,
    Intermediate,
    Advanced,
}

impl From<DifficultyArg> for Difficulty {
    fn from(arg: DifficultyArg) -> Self {
        match arg {
            DifficultyArg::Beginner => Difficulty::Beginner,
            DifficultyArg::Intermediate => Difficulty::Intermediate,
            DifficultyArg::Advanced => Difficulty::Advanced,
        }
    }
}

/// Extensão do material aceita pela CLI, mapeada para [`Volume`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum VolumeArg {
    Brief,
    Standard,
    Detailed,
}

impl From<VolumeArg> for Volume {
    fn from(arg: VolumeArg) -> Self {
        match arg {
            VolumeArg::Brief => Volume::Brief,
            VolumeArg::Standard => Volume::Standard,
            VolumeArg::Detailed => Volume::Detailed,
        }
    }
}

/// Endpoint de polling aceito pela CLI, mapeado para [`PollSource`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SourceArg {
    /// `GET {base}/process/result/{id}`.
    ProcessResult,
    /// `GET {base}/state/{id}`.
    ThreadState,
}

impl From<SourceArg> for PollSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::ProcessResult => PollSource::ProcessResult,
            SourceArg::ThreadState => PollSource::ThreadState,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submete um novo job e acompanha até o fim, pedindo feedback quando necessário.
    Create {
        /// Pergunta ou tópico do material a gerar.
        content: String,

        /// Disciplina do material.
        #[arg(long, default_value = "")]
        subject: String,

        #[arg(long, value_enum, default_value_t = DifficultyArg::Intermediate)]
        difficulty: DifficultyArg,

        #[arg(long, value_enum, default_value_t = VolumeArg::Standard)]
        volume: VolumeArg,

        /// Desativa as pausas para revisão humana.
        #[arg(long, default_value_t = false)]
        no_hitl: bool,

        /// Imagens anexadas à submissão (pode repetir).
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },

    /// Acompanha um job já submetido.
    Watch {
        /// Identificador do job (thread id).
        job_id: String,

        /// Conteúdo original, reenviado junto com o feedback.
        #[arg(long, default_value = "")]
        content: String,
    },

    /// Consulta o status de um job uma única vez.
    Status {
        /// Identificador do job (thread id).
        job_id: String,
    },
}
