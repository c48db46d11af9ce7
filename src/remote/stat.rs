use crate::error::ExecError;
use crate::remote::permissions::Permissions;

/// Metadata parsed from one `ls -ld` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub permissions: Permissions,
    pub owner: String,
    pub group: String,
    pub size: u64,
    pub last_modified: String,
}

/// Parses the first non-empty line of a long listing:
/// `perms links owner group size month day time-or-year name...`.
///
/// The name is never read, so spaces in it are harmless. Device entries
/// (`major, minor` instead of a size) report size 0.
pub fn parse_long_listing(command: &str, stdout: &str) -> Result<RemoteFileInfo, ExecError> {
    let unexpected = || ExecError::UnexpectedOutput {
        command: command.to_string(),
        output: stdout.trim().to_string(),
    };

    let line = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(unexpected)?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 9 {
        return Err(unexpected());
    }

    let permissions = Permissions::parse(strip_acl_marker(parts[0]))?;
    let size = parts[4].parse::<u64>().unwrap_or(0);

    Ok(RemoteFileInfo {
        permissions,
        owner: parts[2].to_string(),
        group: parts[3].to_string(),
        size,
        last_modified: parts[5..8].join(" "),
    })
}

/// GNU and BSD `ls` append `+`, `@` or `.` for ACLs, xattrs and
/// security contexts.
fn strip_acl_marker(mode: &str) -> &str {
    if mode.chars().count() == 11 {
        mode.strip_suffix(['+', '@', '.']).unwrap_or(mode)
    } else {
        mode
    }
}
