use std::path::{Path, PathBuf};

/// Write `start.sh` into `dir` with the given body.
///
/// The supervisor runs it through `sh`, so no executable bit is needed.
pub fn write_start_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("start.sh");
    std::fs::write(&path, body).expect("writing start.sh");
    path
}

/// Reads console commands until `stop`, then exits 0.
pub const OBEDIENT_SERVER: &str = r#"echo "Done (0.1s)! For help, type \"help\""
while read line; do
  echo "> $line"
  if [ "$line" = "stop" ]; then
    echo "Stopping server"
    exit 0
  fi
done
exit 0
"#;

/// Ignores the stop command; dies to SIGTERM.
pub const DEAF_SERVER: &str = r#"echo "ready"
while true; do sleep 0.1; done
"#;

/// Ignores the stop command and SIGTERM; only SIGKILL works.
pub const STUBBORN_SERVER: &str = r#"trap '' TERM
echo "ready"
while true; do sleep 0.1; done
"#;

/// Exits on its own with a failure code.
pub const CRASHING_SERVER: &str = r#"echo "starting"
echo "java.lang.OutOfMemoryError" >&2
exit 3
"#;

/// Bytes that pass the core integrity gate.
pub fn fake_jar(len: usize) -> Vec<u8> {
    let mut bytes = vec![b'x'; len.max(2)];
    bytes[0] = b'P';
    bytes[1] = b'K';
    bytes
}
