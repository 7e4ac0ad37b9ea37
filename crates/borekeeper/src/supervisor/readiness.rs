//! Detection of bore's readiness notice in its output.

use std::sync::LazyLock;

use regex::Regex;

use super::state::TunnelInfo;

/// bore logs `listening at <host>:<port>` once the remote port is assigned.
static READY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"listening at ([^:]+):(\d+)").expect("static regex is valid")
});

/// Extract the public endpoint from a line of bore output, if it carries the
/// readiness notice. A port that does not fit in `u16` is not a match.
pub fn parse_ready_line(line: &str) -> Option<TunnelInfo> {
    let caps = READY_RE.captures(line)?;
    let host = caps.get(1)?.as_str();
    let port = caps.get(2)?.as_str().parse::<u16>().ok()?;
    Some(TunnelInfo::from_endpoint(host, port))
}
