//! Roster encoding: `CLIENT_LIST:user1|time1,user2|time2,...`

use linechat_core::{RosterEntry, Username};

/// Prefix of every roster line.
pub const ROSTER_PREFIX: &str = "CLIENT_LIST:";

/// Encodes a full roster snapshot as one line.
///
/// An empty roster encodes as the bare prefix.
pub fn encode_roster(entries: &[RosterEntry]) -> String {
    let members: Vec<String> = entries.iter().map(ToString::to_string).collect();
    format!("{ROSTER_PREFIX}{}", members.join(","))
}

/// Parses a roster line back into entries.
///
/// Returns `None` if the line is not a roster line or an entry is malformed.
pub fn parse_roster(line: &str) -> Option<Vec<RosterEntry>> {
    let body = line.strip_prefix(ROSTER_PREFIX)?;

    if body.is_empty() {
        return Some(Vec::new());
    }

    body.split(',')
        .map(|member| {
            let (name, since) = member.split_once('|')?;
            let username = Username::parse(name).ok()?;
            Some(RosterEntry::new(username, since))
        })
        .collect()
}
