use cnvrg_core::StoreError;
use cnvrg_spec::DefaultsError;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("defaults: {0}")]
    Defaults(#[from] DefaultsError),
    #[error("generator {generator} failed: {message}")]
    Generator { generator: String, message: String },
    #[error("generator {generator}: {kind} {name}: {source}")]
    Create {
        generator: String,
        kind: String,
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("cleanup: {0}")]
    Cleanup(String),
    #[error("encode: {0}")]
    Encode(String),
}

impl ReconcileError {
    /// Generator the failure is attributed to, if any.
    pub fn generator(&self) -> Option<&str> {
        match self {
            ReconcileError::Generator { generator, .. } | ReconcileError::Create { generator, .. } => Some(generator),
            _ => None,
        }
    }
}
