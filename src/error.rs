//! Definition of error and status.

use std::error::Error;
use std::fmt;

/// Status of `HazardEpoch`
#[derive(PartialEq, Copy, Clone, Debug)]
pub enum Status {
    /// Success
    Success,
    /// Null node or a handle not owned by the calling thread
    InvalidParam,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Returned by `pop`/`dequeue` when the container holds no element at the moment of the call.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub struct EmptyError;

impl fmt::Display for EmptyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("container is empty")
    }
}

impl Error for EmptyError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_base() {
        let s = Status::Success;
        let a = format!("{}", s);
        assert_eq!(a, "Success");
        assert_eq!(format!("{}", Status::InvalidParam), "InvalidParam");
    }

    #[test]
    fn test_empty_error() {
        let e: Box<dyn Error> = Box::new(EmptyError);
        assert_eq!(e.to_string(), "container is empty");
    }
}
