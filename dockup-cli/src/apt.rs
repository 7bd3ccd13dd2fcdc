//! APT plumbing: package state queries, installs and the sources line

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::exec::{CommandRunner, Invocation};
use crate::host::HostInfo;

const INSTALLED: &str = "install ok installed";

pub fn update() -> Invocation {
    Invocation::new("apt-get", ["update"]).env("DEBIAN_FRONTEND", "noninteractive")
}

pub fn install(packages: &[String]) -> Invocation {
    let args = ["install", "-y", "--no-install-recommends"]
        .into_iter()
        .map(String::from)
        .chain(packages.iter().cloned());
    Invocation::new("apt-get", args).env("DEBIAN_FRONTEND", "noninteractive")
}

/// Packages from `packages` that dpkg does not report as installed
pub fn missing_packages(runner: &dyn CommandRunner, packages: &[String]) -> Result<Vec<String>> {
    if packages.is_empty() {
        return Ok(Vec::new());
    }

    // dpkg-query exits non-zero when any package is unknown but still
    // prints the ones it knows, so the status code is ignored here.
    let args = ["-W", "-f=${Package} ${Status}\\n"]
        .into_iter()
        .map(String::from)
        .chain(packages.iter().cloned());
    let output = runner.run(&Invocation::new("dpkg-query", args))?;

    let installed: Vec<&str> = output
        .stdout
        .lines()
        .filter_map(|line| line.split_once(' '))
        .filter(|(_, status)| status.trim() == INSTALLED)
        .map(|(name, _)| name.split(':').next().unwrap_or(name))
        .collect();

    Ok(packages
        .iter()
        .filter(|pkg| !installed.contains(&pkg.as_str()))
        .cloned()
        .collect())
}

/// The one-line sources entry for Docker's repository
pub fn sources_line(config: &ProvisionConfig, host: &HostInfo) -> String {
    format!(
        "deb [arch={} signed-by={}] {}/{} {} {}",
        host.arch,
        config.keyring_path.display(),
        config.repo_base_url.trim_end_matches('/'),
        host.distro,
        host.codename,
        config.channel,
    )
}

/// URL of the repository signing key
pub fn key_url(config: &ProvisionConfig, host: &HostInfo) -> String {
    format!(
        "{}/{}/gpg",
        config.repo_base_url.trim_end_matches('/'),
        host.distro
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::host::{Arch, Distro};
    use crate::testing::ScriptedRunner;

    fn jammy() -> HostInfo {
        HostInfo {
            distro: Distro::Ubuntu,
            codename: "jammy".to_string(),
            arch: Arch::Amd64,
            user: "alice".to_string(),
            pretty_name: None,
        }
    }

    #[test]
    fn test_sources_line_ubuntu_jammy_amd64() {
        let line = sources_line(&ProvisionConfig::default(), &jammy());
        assert_eq!(
            line,
            "deb [arch=amd64 signed-by=/etc/apt/keyrings/docker.asc] https://download.docker.com/linux/ubuntu jammy stable"
        );
    }

    #[test]
    fn test_key_url() {
        let host = HostInfo {
            distro: Distro::Debian,
            codename: "bookworm".to_string(),
            ..jammy()
        };
        assert_eq!(
            key_url(&ProvisionConfig::default(), &host),
            "https://download.docker.com/linux/debian/gpg"
        );
    }

    #[test]
    fn test_missing_packages_parses_dpkg_query() {
        let packages: Vec<String> = ["curl", "gnupg", "ca-certificates"]
            .into_iter()
            .map(String::from)
            .collect();
        let runner = ScriptedRunner::new().respond(
            "dpkg-query -W -f=${Package} ${Status}\\n curl gnupg ca-certificates",
            CommandOutput {
                code: Some(1),
                stdout: "curl install ok installed\ngnupg deinstall ok config-files\n".to_string(),
                stderr: "dpkg-query: no packages found matching ca-certificates\n".to_string(),
            },
        );

        let missing = missing_packages(&runner, &packages).unwrap();
        assert_eq!(missing, vec!["gnupg".to_string(), "ca-certificates".to_string()]);
    }

    #[test]
    fn test_install_invocation() {
        let invocation = install(&["curl".to_string()]);
        assert_eq!(
            invocation.to_string(),
            "DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends curl"
        );
    }
}
