// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub const LIST_ENVS_CMD: &str = "conda env list";

/// Substring match over `conda env list`, so `cleps` also matches `cleps-env`.
pub fn env_listed(listing: &str, name: &str) -> bool {
    listing.lines().any(|line| line.contains(name))
}

pub fn create_env_command(name: &str, remote_spec_file: &str) -> String {
    format!("conda env create -n {name} -f {remote_spec_file} -y")
}

pub fn install_command(workload_path: &str, name: &str, install: &str) -> String {
    format!("cd {workload_path} && conda activate {name} && {install}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "# conda environments:\n#\nbase                  *  /home/alice/miniconda3\ncleps-env                /home/alice/miniconda3/envs/cleps-env\n";

    #[test]
    fn env_listed_matches_substrings() {
        assert!(env_listed(LISTING, "cleps-env"));
        assert!(env_listed(LISTING, "cleps"));
        assert!(!env_listed(LISTING, "torch"));
    }

    #[test]
    fn commands_render() {
        assert_eq!(
            create_env_command("sim", "~/work/sim/environment.yml"),
            "conda env create -n sim -f ~/work/sim/environment.yml -y"
        );
        assert_eq!(
            install_command("~/work/sim", "sim", "pip install -e ."),
            "cd ~/work/sim && conda activate sim && pip install -e ."
        );
    }
}
