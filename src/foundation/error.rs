pub type ParconvResult<T> = Result<T, ParconvError>;

#[derive(thiserror::Error, Debug)]
pub enum ParconvError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid kernel: {0}")]
    InvalidKernel(String),

    #[error("dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("barrier overuse: armed for {armed} completions, received a further signal")]
    BarrierOveruse { armed: u32 },

    #[error("worker failure: {0}")]
    Worker(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ParconvError {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn invalid_kernel(msg: impl Into<String>) -> Self {
        Self::InvalidKernel(msg.into())
    }

    pub fn dimension_mismatch(expected: (u32, u32), got: (u32, u32)) -> Self {
        Self::DimensionMismatch {
            expected_width: expected.0,
            expected_height: expected.1,
            width: got.0,
            height: got.1,
        }
    }

    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ParconvError::invalid_configuration("x")
                .to_string()
                .contains("invalid configuration:")
        );
        assert!(
            ParconvError::invalid_kernel("x")
                .to_string()
                .contains("invalid kernel:")
        );
        assert!(
            ParconvError::dimension_mismatch((4, 4), (2, 3))
                .to_string()
                .contains("dimension mismatch: expected 4x4, got 2x3")
        );
        assert!(
            ParconvError::BarrierOveruse { armed: 2 }
                .to_string()
                .contains("barrier overuse:")
        );
        assert!(ParconvError::worker("x").to_string().contains("worker failure:"));
        assert!(ParconvError::codec("x").to_string().contains("codec error:"));
        assert!(ParconvError::config("x").to_string().contains("config error:"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ParconvError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
