//! Default shell-command risk classification.
//!
//! Hosts wire this through their [`crate::permission::PermissionHandler`]:
//! blocked commands are denied outright, risky ones prompt the user, and
//! everything else runs. The lists cover the canonical categories; hosts
//! with stricter needs layer their own rules on top.

/// Risk category for a shell command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandRisk {
    /// Run without asking.
    Safe,
    /// Ask the user first.
    NeedsConfirmation,
    /// Never run.
    Blocked,
}

/// Substrings that identify commands which are never allowed.
const BLOCKED: &[&str] = &[
    // Filesystem formatting.
    "mkfs",
    "mke2fs",
    // Fork bomb.
    ":(){",
    ":()  {",
    // System shutdown.
    "shutdown",
    "poweroff",
    "reboot",
    "halt -f",
    "init 0",
];

/// Substrings that require user confirmation.
const CONFIRM: &[&str] = &[
    // Recursive deletes.
    "rm -r",
    "rm -f",
    "rmdir",
    // Force pushes.
    "push --force",
    "push -f",
    // Privilege escalation.
    "sudo ",
    "doas ",
    // Package installs.
    "apt install",
    "apt-get install",
    "yum install",
    "dnf install",
    "pacman -s",
    "npm install -g",
    "pip install",
    "cargo install",
    "brew install",
    // Network fetches.
    "curl ",
    "wget ",
];

/// Protected directories; writes or edits under them require confirmation.
const PROTECTED_DIRS: &[&str] = &["/etc/", "/usr/", "/boot/", "/bin/", "/sbin/", "/lib/", "/sys/"];

/// Classify a shell command string.
pub fn classify_command(command: &str) -> CommandRisk {
    let normalized = normalize(command);

    for pattern in BLOCKED {
        if normalized.contains(pattern) {
            return CommandRisk::Blocked;
        }
    }

    // Recursive chmod of the filesystem root.
    if normalized.contains("chmod -r") && targets_root(&normalized) {
        return CommandRisk::Blocked;
    }

    // Deleting the filesystem root is never a confirmation matter.
    if (normalized.contains("rm -rf") || normalized.contains("rm -fr")) && targets_root(&normalized)
    {
        return CommandRisk::Blocked;
    }

    for pattern in CONFIRM {
        if normalized.contains(pattern) {
            return CommandRisk::NeedsConfirmation;
        }
    }

    if touches_protected_dir(&normalized) {
        return CommandRisk::NeedsConfirmation;
    }

    CommandRisk::Safe
}

fn normalize(command: &str) -> String {
    command
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether any argument is the filesystem root itself.
fn targets_root(normalized: &str) -> bool {
    normalized
        .split_whitespace()
        .any(|token| token == "/" || token == "/*")
}

/// Whether the command writes into a protected system directory.
fn touches_protected_dir(normalized: &str) -> bool {
    let writes = normalized.starts_with("mv ")
        || normalized.starts_with("cp ")
        || normalized.starts_with("tee ")
        || normalized.contains("> /")
        || normalized.contains(">> /")
        || normalized.contains("tee /");
    if !writes {
        return false;
    }
    PROTECTED_DIRS
        .iter()
        .any(|dir| normalized.contains(dir) || normalized.contains(&dir[..dir.len() - 1]))
}
