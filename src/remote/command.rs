//! Shell command composition for path-bearing operations
//!
//! Every path and name is single-quoted, and option parsing is ended with
//! `--` before operands, so no argument is ever interpreted by the remote
//! shell.

/// POSIX single-quote `arg`.
pub fn quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

pub fn list(path: &str) -> String {
    format!("cd {} && ls -1", quote(path))
}

/// Long listing of exactly one entry.
pub fn stat(path: &str, name: &str) -> String {
    format!("cd {} && LC_ALL=C ls -ld -- {}", quote(path), quote(name))
}

pub fn mkdir(path: &str, name: &str) -> String {
    format!("cd {} && mkdir -- {}", quote(path), quote(name))
}

pub fn remove(path: &str, name: &str) -> String {
    format!("cd {} && rm -rf -- {}", quote(path), quote(name))
}

pub fn rename(path: &str, name: &str, new_name: &str) -> String {
    format!(
        "cd {} && mv -- {} {}",
        quote(path),
        quote(name),
        quote(new_name)
    )
}

pub fn move_entry(name: &str, src_path: &str, dst_path: &str) -> String {
    format!(
        "cd {} && mv -- {} {}",
        quote(src_path),
        quote(name),
        quote(dst_path)
    )
}

pub fn home() -> String {
    "pwd".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain_and_spaced() {
        assert_eq!(quote("/home/u"), "'/home/u'");
        assert_eq!(quote("/home/u/My Documents"), "'/home/u/My Documents'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_quote_neutralizes_metacharacters() {
        assert_eq!(quote("it's"), "'it'\\''s'");
        assert_eq!(quote("$(rm -rf ~); `id`"), "'$(rm -rf ~); `id`'");
    }

    #[test]
    fn test_command_shapes() {
        assert_eq!(list("/tmp/a b"), "cd '/tmp/a b' && ls -1");
        assert_eq!(stat("/tmp", "x"), "cd '/tmp' && LC_ALL=C ls -ld -- 'x'");
        assert_eq!(remove("/tmp", "-rf"), "cd '/tmp' && rm -rf -- '-rf'");
        assert_eq!(rename("/tmp", "a", "b"), "cd '/tmp' && mv -- 'a' 'b'");
        assert_eq!(
            move_entry("a.txt", "/src", "/dst dir"),
            "cd '/src' && mv -- 'a.txt' '/dst dir'"
        );
    }
}
