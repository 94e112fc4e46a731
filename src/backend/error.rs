//! Tipos de erro da camada de comunicação com o backend.
//!
//! [`TransportError`] cobre os casos em que nenhuma resposta foi recebida
//! (rede, timeout, requisição impossível de montar). [`ProtocolError`] cobre
//! respostas recebidas mas fora do formato esperado, o que indica
//! incompatibilidade de versão entre cliente e backend.

use thiserror::Error;

/// Nenhuma resposta foi recebida do backend.
#[derive(Debug, Error)]
pub enum TransportError {
    /// O prazo da requisição (ou da conexão) expirou.
    #[error("request timed out")]
    Timeout,

    /// Falha na camada de rede (DNS, conexão recusada, conexão interrompida).
    #[error("network error: {0}")]
    Network(String),

    /// A requisição não pôde ser montada (URL inválida, MIME inválido, JSON).
    #[error("failed to encode request: {0}")]
    Encode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::Encode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Uma resposta chegou, mas não tem o formato combinado.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP 401: a credencial foi rejeitada.
    #[error("backend rejected the credentials (status 401)")]
    Unauthorized,

    /// Qualquer status diferente de 200/202/401.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Corpo vazio, JSON inválido ou campos com tipo errado.
    #[error("malformed response body: {0}")]
    MalformedBody(String),

    /// O corpo é JSON válido, mas não é um objeto.
    #[error("response body is not a JSON object")]
    NotAnObject,

    /// Uma submissão aceita sem identificador de job.
    #[error("response did not carry a job id")]
    MissingJobId,

    /// Interrupção vazia ou com entradas que não são texto.
    #[error("invalid interrupt payload: {0}")]
    InvalidInterrupt(String),

    /// O backend respondeu sobre outro job.
    #[error("job id changed from {expected} to {actual}")]
    JobIdMismatch { expected: String, actual: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_display() {
        assert_eq!(TransportError::Timeout.to_string(), "request timed out");
        assert_eq!(
            TransportError::Network("connection refused".into()).to_string(),
            "network error: connection refused"
        );
    }

    #[test]
    fn protocol_display() {
        let err = ProtocolError::UnexpectedStatus {
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "unexpected status 503: unavailable");

        let err = ProtocolError::JobIdMismatch {
            expected: "abc".into(),
            actual: "xyz".into(),
        };
        assert_eq!(err.to_string(), "job id changed from abc to xyz");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TransportError>();
        assert_send_sync::<ProtocolError>();
    }
}
