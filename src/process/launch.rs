// src/process/launch.rs

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use globset::Glob;
use tokio::process::Command;
use tracing::debug;

use crate::config::LaunchConfig;
use crate::errors::ProcessError;
use crate::fs::FileSystem;

/// What a server directory will be started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// A start script, run through the platform shell.
    Script(PathBuf),
    /// A core jar, run as `java [jvm args] -jar <core> [server args]`.
    Core(PathBuf),
}

/// Fully resolved command line for one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub target: LaunchTarget,
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl LaunchPlan {
    /// Human-readable command line, for logs and errors.
    pub fn describe(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    /// Build the command with all three standard streams piped.
    ///
    /// On Unix the child leads its own process group so a terminate or kill
    /// also reaches anything a start script forks.
    pub fn command(&self, working_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// Decide how to launch the server in `dir`.
///
/// A start script wins over a core jar; among jars the lexicographically
/// first match of `core_glob` is used.
pub fn resolve_launch(
    fs: &dyn FileSystem,
    dir: &Path,
    launch: &LaunchConfig,
) -> Result<LaunchPlan, ProcessError> {
    for script in launch.start_scripts.iter() {
        let path = dir.join(script);
        if fs.is_file(&path) {
            debug!(dir = ?dir, script = %script, "using start script");
            return Ok(script_plan(path));
        }
    }

    let not_found = || ProcessError::LaunchNotFound {
        dir: dir.to_path_buf(),
        pattern: launch.core_glob.clone(),
    };

    let matcher = Glob::new(&launch.core_glob)
        .map_err(|_| not_found())?
        .compile_matcher();

    let entries = fs
        .read_dir(dir)
        .map_err(|source| ProcessError::Filesystem {
            dir: dir.to_path_buf(),
            source,
        })?;

    let mut cores: Vec<PathBuf> = entries
        .into_iter()
        .filter(|p| fs.is_file(p))
        .filter(|p| p.file_name().is_some_and(|name| matcher.is_match(name)))
        .collect();
    cores.sort();

    let core = cores.into_iter().next().ok_or_else(not_found)?;
    debug!(dir = ?dir, core = ?core, "using core file");
    Ok(core_plan(core, launch))
}

fn script_plan(path: PathBuf) -> LaunchPlan {
    let file_name: OsString = path.file_name().map(Into::into).unwrap_or_default();
    let (program, mut args): (OsString, Vec<OsString>) = if cfg!(windows) {
        ("cmd".into(), vec!["/C".into()])
    } else {
        ("sh".into(), Vec::new())
    };
    args.push(file_name);
    LaunchPlan {
        target: LaunchTarget::Script(path),
        program,
        args,
    }
}

fn core_plan(core: PathBuf, launch: &LaunchConfig) -> LaunchPlan {
    let mut args: Vec<OsString> = launch.jvm_args.iter().map(OsString::from).collect();
    args.push("-jar".into());
    args.push(core.file_name().map(Into::into).unwrap_or_default());
    args.extend(launch.server_args.iter().map(OsString::from));
    LaunchPlan {
        target: LaunchTarget::Core(core),
        program: OsString::from(&launch.java),
        args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn launch_config() -> LaunchConfig {
        LaunchConfig {
            java: "java".to_string(),
            jvm_args: vec!["-Xmx1G".to_string()],
            server_args: vec!["nogui".to_string()],
            core_glob: "*.jar".to_string(),
            start_scripts: vec!["start.sh".to_string()],
        }
    }

    #[test]
    fn start_script_takes_priority_over_jar() {
        let fs = MockFileSystem::new();
        fs.add_file("/srv/a/start.sh", b"java -jar paper.jar".to_vec());
        fs.add_file("/srv/a/paper.jar", b"PK".to_vec());

        let plan = resolve_launch(&fs, Path::new("/srv/a"), &launch_config()).unwrap();
        assert_eq!(plan.target, LaunchTarget::Script(PathBuf::from("/srv/a/start.sh")));
    }

    #[test]
    fn first_jar_in_lexicographic_order_is_used() {
        let fs = MockFileSystem::new();
        fs.add_file("/srv/a/spigot.jar", b"PK".to_vec());
        fs.add_file("/srv/a/paper.jar", b"PK".to_vec());
        fs.add_file("/srv/a/server.properties", b"motd=hi".to_vec());

        let plan = resolve_launch(&fs, Path::new("/srv/a"), &launch_config()).unwrap();
        assert_eq!(plan.target, LaunchTarget::Core(PathBuf::from("/srv/a/paper.jar")));
        assert_eq!(plan.describe(), "java -Xmx1G -jar paper.jar nogui");
    }

    #[test]
    fn directory_named_like_a_jar_is_ignored() {
        let fs = MockFileSystem::new();
        fs.add_dir("/srv/a/libs.jar");
        fs.add_file("/srv/a/vanilla.jar", b"PK".to_vec());

        let plan = resolve_launch(&fs, Path::new("/srv/a"), &launch_config()).unwrap();
        assert_eq!(plan.target, LaunchTarget::Core(PathBuf::from("/srv/a/vanilla.jar")));
    }

    #[test]
    fn empty_directory_is_launch_not_found() {
        let fs = MockFileSystem::new();
        fs.add_dir("/srv/a");

        let err = resolve_launch(&fs, Path::new("/srv/a"), &launch_config()).unwrap_err();
        assert!(matches!(err, ProcessError::LaunchNotFound { ref pattern, .. } if pattern == "*.jar"));
    }

    #[test]
    fn missing_directory_is_a_filesystem_error() {
        let fs = MockFileSystem::new();
        let err = resolve_launch(&fs, Path::new("/nope"), &launch_config()).unwrap_err();
        assert!(matches!(err, ProcessError::Filesystem { .. }));
    }
}
