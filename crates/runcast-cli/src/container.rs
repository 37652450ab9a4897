use std::{path::Path, process::ExitCode};

use anyhow::Context as _;
use runcast_container::{
    diff::restart_policy_changed, editor::ContainerEditor, needs_recreation, ContainerInfo,
};

use crate::cli::ContainerCommand;

pub fn run(command: ContainerCommand) -> anyhow::Result<ExitCode> {
    match command {
        ContainerCommand::Diff { old, new } => {
            let old = read_info(&old)?;
            let new = read_info(&new)?;
            println!("{}", verdict(&old, &new));
            Ok(ExitCode::SUCCESS)
        }
        ContainerCommand::ImportEnv {
            info,
            env_file,
            write,
        } => {
            let current = read_info(&info)?;
            let text = std::fs::read_to_string(&env_file)
                .with_context(|| format!("reading {}", env_file.display()))?;

            let mut editor = ContainerEditor::from_info(&current);
            let report = editor.import_env_file(&text);
            let merged = editor.build();

            eprintln!(
                "imported {}, blocked {}, malformed {}{}",
                report.imported,
                report.blocked,
                report.malformed,
                if report.truncated { " (stopped at the entry cap)" } else { "" }
            );
            let json = serde_json::to_string_pretty(&merged)?;
            if write {
                std::fs::write(&info, format!("{json}\n"))
                    .with_context(|| format!("writing {}", info.display()))?;
            } else {
                println!("{json}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read_info(path: &Path) -> anyhow::Result<ContainerInfo> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn verdict(old: &ContainerInfo, new: &ContainerInfo) -> &'static str {
    if needs_recreation(old, new) {
        "recreate"
    } else if restart_policy_changed(old, new) {
        "update restart policy in place"
    } else {
        "no change"
    }
}

#[cfg(test)]
mod tests {
    use runcast_container::RestartPolicy;

    use super::*;

    #[test]
    fn verdicts() {
        let old = ContainerInfo::new("nginx:1.27");
        let mut policy = old.clone();
        policy.restart_policy = RestartPolicy::Always;
        let mut image = old.clone();
        image.image = "nginx:1.28".into();

        assert_eq!(verdict(&old, &old), "no change");
        assert_eq!(verdict(&old, &policy), "update restart policy in place");
        assert_eq!(verdict(&old, &image), "recreate");
    }

    #[test]
    fn import_env_writes_back() {
        let dir = tempfile::tempdir().unwrap();
        let info_path = dir.path().join("web.json");
        let env_path = dir.path().join("web.env");
        let mut info = ContainerInfo::new("nginx:1.27");
        info.environment.insert("KEEP".into(), "1".into());
        std::fs::write(&info_path, serde_json::to_string(&info).unwrap()).unwrap();
        std::fs::write(&env_path, "FOO=bar\n# comment\n\nLD_PRELOAD=/evil.so\n").unwrap();

        run(ContainerCommand::ImportEnv {
            info: info_path.clone(),
            env_file: env_path,
            write: true,
        })
        .unwrap();

        let merged = read_info(&info_path).unwrap();
        assert_eq!(merged.environment.len(), 2);
        assert_eq!(merged.environment["FOO"], "bar");
        assert_eq!(merged.environment["KEEP"], "1");
    }
}
