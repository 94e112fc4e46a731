//! Configuração do LESSONFORGE carregada a partir de `lessonforge.toml`.
//!
//! A struct [`LessonforgeConfig`] reúne o endereço do backend, credencial,
//! prazos de requisição e o intervalo de polling. Valores ausentes no
//! arquivo usam defaults sensíveis. As variáveis de ambiente
//! `LESSONFORGE_API_TOKEN` e `LESSONFORGE_BASE_URL` têm precedência sobre o arquivo.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::backend::{HttpOptions, PollSource};

const CONFIG_FILE: &str = "lessonforge.toml";

/// Configuração de nível superior carregada de `lessonforge.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LessonforgeConfig {
    /// URL base da API, incluindo o prefixo (ex.: `http://localhost:8000/api`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Token enviado como `Authorization: Bearer`. Vazio desativa o cabeçalho.
    #[serde(default)]
    pub api_token: String,

    /// Intervalo entre consultas de status, em milissegundos.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Prazo de cada consulta de status, em milissegundos.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Prazo de submissões e feedback (que carregam imagens), em milissegundos.
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,

    /// Prazo para estabelecer conexão, em milissegundos.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Endpoint consultado durante o polling.
    #[serde(default)]
    pub poll_source: PollSource,

    /// Envia eventos de cliente (interrupções, feedback, erros) ao backend.
    #[serde(default)]
    pub telemetry: bool,

    /// Identificador do usuário repassado em submissões e feedback.
    #[serde(default)]
    pub user_id: Option<String>,
}

// Valor padrão para a URL base: backend local.
fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

// Valor padrão para o intervalo de polling: 3000ms.
fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_submit_timeout_ms() -> u64 {
    60_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for LessonforgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            submit_timeout_ms: default_submit_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            poll_source: PollSource::default(),
            telemetry: false,
            user_id: None,
        }
    }
}

impl LessonforgeConfig {
    /// Carrega a configuração de `lessonforge.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(Path::new(CONFIG_FILE))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Lê um arquivo específico, sem consultar o ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str::<LessonforgeConfig>(&contents)
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("LESSONFORGE_API_TOKEN")
            && !token.is_empty()
        {
            self.api_token = token;
        }
        if let Some(url) = lookup("LESSONFORGE_BASE_URL")
            && !url.is_empty()
        {
            self.base_url = url;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Opções do transporte HTTP derivadas desta configuração.
    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            base_url: self.base_url.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            poll_timeout: Duration::from_millis(self.request_timeout_ms),
            submit_timeout: Duration::from_millis(self.submit_timeout_ms),
        }
    }
}
