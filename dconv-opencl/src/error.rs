use opencl3::error_codes::ClError;
use opencl3::types::cl_int;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("OpenCL error {code} ({code_str}){}", fmt_msg(.msg))]
    ClError {
        code: cl_int,
        code_str: String,
        msg: Option<String>,
    },
    #[error("failed to build program: {0}")]
    CreateProgramError(String),
    #[error("no OpenCL devices found")]
    NoDevicesFound,
    #[error("{0}")]
    ValidationError(String),
}

fn fmt_msg(msg: &Option<String>) -> String {
    match msg {
        Some(msg) => format!(": {msg}"),
        None => String::new(),
    }
}

impl Error {
    pub fn from_cl_err<M>(err: ClError, msg: M) -> Self
    where
        M: Into<String>,
    {
        Error::ClError {
            code: err.0,
            code_str: err.to_string(),
            msg: Some(msg.into()),
        }
    }
}

impl From<ClError> for Error {
    fn from(value: ClError) -> Self {
        Error::ClError {
            code: value.0,
            code_str: value.to_string(),
            msg: None,
        }
    }
}

impl From<Error> for dconv::Error {
    fn from(value: Error) -> Self {
        dconv::Error::Device(value.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::Error;
    use opencl3::error_codes::ClError;

    #[test]
    fn test_into_device_error() {
        let err = Error::from_cl_err(ClError(-5), "Failed to enqueue gemm kernel");
        let converted: dconv::Error = err.into();
        match converted {
            dconv::Error::Device(msg) => {
                assert!(msg.contains("-5"), "{msg}");
                assert!(msg.ends_with("Failed to enqueue gemm kernel"), "{msg}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_validation_message() {
        let err = Error::ValidationError("bad".to_string());
        assert_eq!(err.to_string(), "bad");
        assert_eq!(Error::NoDevicesFound.to_string(), "no OpenCL devices found");
    }
}
