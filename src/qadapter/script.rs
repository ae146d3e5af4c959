//! Shell script assembly

use super::job::EnvVars;
use super::queue::QueueType;

/// Line-oriented builder for bash scripts
#[derive(Debug, Clone, Default)]
pub struct ScriptEditor {
    lines: Vec<String>,
}

impl ScriptEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn add_lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
    }

    pub fn add_comment(&mut self, comment: &str) {
        self.lines.push(format!("# {}", comment));
    }

    pub fn add_emptyline(&mut self) {
        self.lines.push(String::new());
    }

    pub fn declare_var(&mut self, key: &str, value: &str) {
        self.lines.push(format!("export {}={}", key, value));
    }

    pub fn declare_vars(&mut self, vars: &EnvVars) {
        for (key, value) in vars.iter() {
            self.declare_var(key, value);
        }
    }

    /// `module load` each module, collecting errors in `mods.err`
    pub fn load_modules(&mut self, modules: &[String]) {
        for module in modules {
            self.lines.push(format!("module load {} 2>> mods.err", module));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines joined with newlines
    pub fn script_str(&self) -> String {
        self.lines.join("\n")
    }
}

/// Queue header with only the parameters present in `params`, in the
/// engine order, followed by `qverbatim`
pub(crate) fn render_header(qtype: QueueType, params: &[(String, String)], qverbatim: Option<&str>) -> String {
    let mut header = String::from("#!/bin/bash\n");

    if let Some(directive) = qtype.directive() {
        for (key, option) in qtype.header_keys() {
            let value = params
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str());
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                header.push_str(&format!("{} {}{}\n", directive, option, value));
            }
        }
    }

    if let Some(verbatim) = qverbatim.map(str::trim_end).filter(|s| !s.is_empty()) {
        header.push_str(verbatim);
        header.push('\n');
    }

    header
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_slurm_header_order_and_filtering() {
        let header = render_header(
            QueueType::Slurm,
            &params(&[("time", "0-01:00:00"), ("partition", "debug"), ("account", "")]),
            Some("#SBATCH --exclusive"),
        );
        assert_eq!(
            header,
            "#!/bin/bash\n#SBATCH --partition=debug\n#SBATCH --time=0-01:00:00\n#SBATCH --exclusive\n"
        );
    }

    #[test]
    fn test_pbs_header() {
        let header = render_header(
            QueueType::PbsPro,
            &params(&[("queue", "main"), ("select", "4:ncpus=1:mem=1024mb"), ("walltime", "01:00:00")]),
            None,
        );
        assert!(header.contains("#PBS -q main\n"));
        assert!(header.contains("#PBS -l select=4:ncpus=1:mem=1024mb\n"));
        assert!(header.find("-q main").unwrap() < header.find("walltime").unwrap());
    }

    #[test]
    fn test_shell_header_is_shebang_only() {
        let header = render_header(QueueType::Shell, &params(&[("time", "1")]), None);
        assert_eq!(header, "#!/bin/bash\n");
    }

    #[test]
    fn test_editor() {
        let mut se = ScriptEditor::new();
        se.add_comment("Load Modules");
        se.add_line("module purge");
        se.load_modules(&["intel/2023".to_string()]);
        let mut env = EnvVars::new();
        env.set("OMP_NUM_THREADS", "1");
        se.declare_vars(&env);
        assert_eq!(
            se.script_str(),
            "# Load Modules\nmodule purge\nmodule load intel/2023 2>> mods.err\nexport OMP_NUM_THREADS=1"
        );
    }
}
