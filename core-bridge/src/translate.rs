//! Native status codes to [`BridgeError`].

use bridge_traits::{ErrorCode, NativeConnection, NativeError};
use tracing::debug;

use crate::error::BridgeError;

/// Translate a native failure.
///
/// `END_OF_FILE` becomes [`BridgeError::EndOfStream`]. `NO_CHANNELS` becomes
/// [`BridgeError::NoChannelsAvailable`] carrying the per-channel codes read
/// from `connection` at translation time; any channel the connection cannot
/// report is given as [`ErrorCode::NONE`]. Everything else becomes
/// [`BridgeError::NativeOperationFailed`].
pub fn translate(error: NativeError, connection: Option<&dyn NativeConnection>) -> BridgeError {
    match error.code {
        ErrorCode::END_OF_FILE => BridgeError::EndOfStream,
        ErrorCode::NO_CHANNELS => no_channels(connection),
        code => BridgeError::NativeOperationFailed {
            code,
            description: error.description,
        },
    }
}

/// Translate a bare status code from a completion.
pub fn translate_code(code: ErrorCode, connection: Option<&dyn NativeConnection>) -> BridgeError {
    translate(NativeError::from_code(code), connection)
}

fn no_channels(connection: Option<&dyn NativeConnection>) -> BridgeError {
    let Some(connection) = connection else {
        return BridgeError::NoChannelsAvailable {
            local: ErrorCode::NONE,
            remote: ErrorCode::NONE,
            direct_candidates: ErrorCode::NONE,
        };
    };

    let local = connection.local_channel_error_code().unwrap_or(ErrorCode::NONE);
    let remote = connection.remote_channel_error_code().unwrap_or(ErrorCode::NONE);
    let direct_candidates = connection
        .direct_candidates_channel_error_code()
        .unwrap_or(ErrorCode::NONE);

    debug!(%local, %remote, %direct_candidates, "Connect failed on every channel");

    BridgeError::NoChannelsAvailable {
        local,
        remote,
        direct_candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockConnection;

    #[test]
    fn test_end_of_file() {
        assert_eq!(
            translate_code(ErrorCode::END_OF_FILE, None),
            BridgeError::EndOfStream
        );
    }

    #[test]
    fn test_other_codes_keep_description() {
        let err = translate(NativeError::new(ErrorCode::ACCESS_DENIED, "bad password"), None);
        assert_eq!(
            err,
            BridgeError::NativeOperationFailed {
                code: ErrorCode::ACCESS_DENIED,
                description: "bad password".to_string(),
            }
        );
    }

    #[test]
    fn test_no_channels_reads_connection() {
        let mut conn = MockConnection::new();
        conn.expect_local_channel_error_code()
            .returning(|| Ok(ErrorCode::NOT_FOUND));
        conn.expect_remote_channel_error_code()
            .returning(|| Ok(ErrorCode::TIMEOUT));
        conn.expect_direct_candidates_channel_error_code()
            .returning(|| Err(NativeError::not_supported("direct candidates")));

        let err = translate_code(ErrorCode::NO_CHANNELS, Some(&conn));
        assert_eq!(
            err,
            BridgeError::NoChannelsAvailable {
                local: ErrorCode::NOT_FOUND,
                remote: ErrorCode::TIMEOUT,
                direct_candidates: ErrorCode::NONE,
            }
        );
    }

    #[test]
    fn test_no_channels_without_connection() {
        let err = translate_code(ErrorCode::NO_CHANNELS, None);
        assert_eq!(err.code(), "NO_CHANNELS_AVAILABLE");
    }
}
