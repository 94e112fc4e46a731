//! Interface de terminal do LESSONFORGE: spinner e saída colorida.
//!
//! Usa as crates `indicatif` para o spinner de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente
//! um job enquanto o backend trabalha.

use std::io::Write;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use lessonforge::status::{Phase, StatusModel};

/// Indicador visual de progresso para um job no terminal.
///
/// Exibe um spinner durante o processamento e mensagens coloridas para
/// sucesso (verde), falha (vermelho) e pedidos de revisão (amarelo).
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl JobProgress {
    /// Inicia o spinner com uma descrição curta do job.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("SUBMITTING: {description}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Atualiza a mensagem do spinner com a fase e a etapa atuais.
    pub fn update(&self, status: &StatusModel) {
        let message = match &status.current_stage {
            Some(stage) => format!("{} [{stage}] {}", status.phase(), status.job_id),
            None => format!("{} {}", status.phase(), status.job_id),
        };
        self.pb.set_message(message);
    }

    /// Pausa o spinner e mostra as perguntas do backend.
    pub fn interrupt(&self, status: &StatusModel) {
        self.pb.set_message(format!("INTERRUPTED {}", status.job_id));
        self.pb.suspend(|| {
            println!("  {} Review requested:", self.yellow.apply_to("?"));
            for message in status.interrupt_messages().unwrap_or_default() {
                println!("    {message}");
            }
            print!("  {} ", self.dim.apply_to("feedback>"));
            let _ = std::io::stdout().flush();
        });
    }

    /// Finaliza o spinner e exibe o resultado em JSON.
    pub fn complete(&self, status: &StatusModel) {
        self.pb.finish_and_clear();
        println!("  {} Job {} completed", self.green.apply_to("✓"), status.job_id);
        if let Some(result) = status.result() {
            println!(
                "{}",
                serde_json::to_string_pretty(result).unwrap_or_default()
            );
        }
    }

    /// Finaliza o spinner e exibe o motivo da falha.
    pub fn fail(&self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", self.red.apply_to("✗"));
    }

    /// Imprime o estado completo de um job, colorido pela fase.
    pub fn print_status(status: &StatusModel) {
        let style = match status.phase() {
            Phase::Completed => Style::new().green().bold(),
            Phase::Failed => Style::new().red().bold(),
            _ => Style::new().yellow(),
        };
        println!("{}", style.apply_to(format!("─── {} ───", status.phase())));
        println!(
            "{}",
            serde_json::to_string_pretty(status).unwrap_or_default()
        );
    }
}
