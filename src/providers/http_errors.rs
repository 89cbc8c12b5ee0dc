use anyhow::anyhow;
use std::error::Error as StdError;
use std::io::ErrorKind;

fn error_chain_has(err: &(dyn StdError + 'static), kind: ErrorKind, needle: &str) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }

        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }

        current = source.source();
    }

    false
}

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has(err, ErrorKind::TimedOut, "timed out")
}

/// Turns a transport failure into a message naming the knob that fixes it.
pub(crate) fn api_request_error(
    service: &str,
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
    base_url_var: &str,
) -> anyhow::Error {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        return anyhow!(
            "{} request timed out after {}s while calling '{}'. \
             Increase MODEL_TIMEOUT_SECS or check service responsiveness.",
            service,
            timeout_secs,
            api_url
        );
    }

    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return anyhow!(
                "Connection refused by {} at '{}'. \
                 Ensure the service is running and {} is correct.",
                service,
                api_url,
                base_url_var
            );
        }

        return anyhow!(
            "Failed to connect to {} at '{}'. \
             Check {} and network connectivity.",
            service,
            api_url,
            base_url_var
        );
    }

    anyhow!("Failed to call {} at '{}': {}", service, api_url, err)
}
