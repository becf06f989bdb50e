use thiserror::Error;

/// Errors surfaced by the DIAL layer.
///
/// Every variant is scoped to one device/operation; nothing here is fatal
/// to the host process. Timeouts are carried inside [`DialError::Unreachable`]
/// as the underlying transport error, so a partitioned device can never
/// leave the client asserting a state it did not just observe.
#[derive(Error, Debug)]
pub enum DialError {
    #[error("device at {url} is unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: ureq::Error,
    },

    #[error("malformed device description at {0}: {1}")]
    MalformedDescription(String, String),

    #[error("device at {0} does not advertise a DIAL service")]
    NoDialService(String),

    #[error("application '{0}' is not installed on the device")]
    AppNotInstalled(String),

    #[error("device is busy, launch of '{0}' refused")]
    DeviceBusy(String),

    #[error("device rejected the {0} operation")]
    OperationNotSupported(String),

    #[error("unparsable status for application '{0}': {1}")]
    MalformedStatus(String, String),

    #[error("invalid launch payload: {0}")]
    InvalidPayload(String),

    #[error("invalid application name '{0}'")]
    InvalidAppName(String),

    #[error("unexpected HTTP status {1} from {0}")]
    UnexpectedStatus(String, u16),
}

impl DialError {
    pub(crate) fn unreachable(url: &str, source: ureq::Error) -> Self {
        DialError::Unreachable {
            url: url.to_string(),
            source,
        }
    }
}
