//! A stateful shell session against the simulated device. One instance per
//! `shell:`/`exec:` stream — `cwd` and command history are per-session, not
//! shared across streams.

use super::fs::NodeType;
use super::Device;

#[derive(Debug, Default, Clone)]
pub struct ShellOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ShellOutcome {
    fn ok(stdout: impl Into<String>) -> Self {
        Self { stdout: stdout.into(), stderr: String::new(), exit_code: 0 }
    }

    fn err(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self { stdout: String::new(), stderr: stderr.into(), exit_code }
    }

    /// Text as it would appear concatenated to a terminal: stdout then
    /// stderr, the order the original's `ShellResponse.as_text()` uses.
    pub fn as_text(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

pub struct Shell {
    device: Device,
    user: String,
    cwd: String,
    history: Vec<String>,
}

impl Shell {
    pub fn new(device: Device, user: impl Into<String>) -> Self {
        let user = user.into();
        let cwd = if user == "shell" { "/data".to_string() } else { "/".to_string() };
        let cwd = if device.with_filesystem_ref(|fs| fs.exists(&cwd, "/")) { cwd } else { "/".to_string() };
        Self { device, user, cwd, history: Vec::new() }
    }

    pub fn prompt(&self) -> String {
        let device_name = self.device.get_property("ro.product.device").unwrap_or_else(|| "mock".to_string());
        format!("{}@{}:{}$ ", self.user, device_name, self.cwd)
    }

    pub fn execute(&mut self, command: &str) -> ShellOutcome {
        let command = command.trim();
        if command.is_empty() {
            return ShellOutcome::default();
        }
        self.history.push(command.to_string());

        let segments: Vec<&str> = command.split(';').map(str::trim).filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return ShellOutcome::default();
        }

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit_code = 0;
        for segment in segments {
            let outcome = self.execute_single(segment);
            stdout.push_str(&outcome.stdout);
            stderr.push_str(&outcome.stderr);
            exit_code = outcome.exit_code;
        }
        ShellOutcome { stdout, stderr, exit_code }
    }

    fn execute_single(&mut self, line: &str) -> ShellOutcome {
        let tokens = shell_words(line);
        let Some((cmd, args)) = tokens.split_first() else {
            return ShellOutcome::default();
        };
        match cmd.as_str() {
            "pwd" => ShellOutcome::ok(format!("{}\n", self.cwd)),
            "cd" => self.cmd_cd(args),
            "ls" => self.cmd_ls(args),
            "cat" => self.cmd_cat(args),
            "echo" => self.cmd_echo(args),
            "mkdir" => self.cmd_mkdir(args),
            "rm" => self.cmd_rm(args),
            "cp" => self.cmd_cp(args),
            "mv" => self.cmd_mv(args),
            "chmod" => self.cmd_chmod(args),
            "chown" => self.cmd_chown(args),
            "ps" => self.cmd_ps(),
            "top" => self.cmd_top(),
            "getprop" => self.cmd_getprop(args),
            "setprop" => self.cmd_setprop(args),
            "pm" => self.cmd_pm(args),
            "logcat" => self.cmd_logcat(),
            "am" => self.cmd_am(args),
            "history" => ShellOutcome::ok(self.history.join("\n") + if self.history.is_empty() { "" } else { "\n" }),
            "true" => ShellOutcome::default(),
            "false" => ShellOutcome { exit_code: 1, ..Default::default() },
            "whoami" => ShellOutcome::ok(format!("{}\n", self.user)),
            "id" => ShellOutcome::ok(format!("uid=2000({}) gid=2000({})\n", self.user, self.user)),
            other => ShellOutcome::err(format!("/system/bin/sh: {other}: not found\n"), 127),
        }
    }

    fn cmd_cd(&mut self, args: &[String]) -> ShellOutcome {
        let target = args.first().map(String::as_str).unwrap_or("/");
        match self.device.with_filesystem_ref(|fs| fs.get_entry(target, &self.cwd, true)) {
            Ok(entry) if entry.node_type == NodeType::Dir => {
                self.cwd = entry.path;
                ShellOutcome::default()
            }
            Ok(_) => ShellOutcome::err(format!("cd: not a directory: {target}\n"), 1),
            Err(e) => ShellOutcome::err(format!("cd: {e}\n"), 1),
        }
    }

    fn cmd_ls(&self, args: &[String]) -> ShellOutcome {
        let mut long_format = false;
        let mut all_entries = false;
        let mut targets = Vec::new();
        for arg in args {
            if let Some(flags) = arg.strip_prefix('-') {
                long_format |= flags.contains('l');
                all_entries |= flags.contains('a');
            } else {
                targets.push(arg.clone());
            }
        }
        if targets.is_empty() {
            targets.push(".".to_string());
        }

        let mut out = String::new();
        for target in &targets {
            let listing = self.device.with_filesystem_ref(|fs| -> Result<_, crate::error::BackendError> {
                let entry = fs.get_entry(target, &self.cwd, false)?;
                if entry.node_type == NodeType::Dir {
                    fs.list_dir(target, &self.cwd)
                } else {
                    Ok(vec![entry])
                }
            });
            match listing {
                Ok(entries) => out.push_str(&self.format_ls(&entries, long_format, all_entries)),
                Err(e) => return ShellOutcome::err(format!("ls: {e}\n"), 1),
            }
        }
        ShellOutcome::ok(out)
    }

    fn format_ls(&self, entries: &[super::fs::Entry], long_format: bool, all_entries: bool) -> String {
        let mut names = Vec::new();
        let mut lines = Vec::new();
        for entry in entries {
            let name = if entry.path == "/" { "/".to_string() } else { entry.path.rsplit('/').next().unwrap().to_string() };
            if !all_entries && name.starts_with('.') && name != "." && name != ".." {
                continue;
            }
            if long_format {
                let perms = super::fs::Filesystem::format_permissions(entry.permissions, entry.node_type);
                lines.push(format!("{perms} {} {} {:>6} {name}", entry.owner, entry.group, entry.size()));
            } else {
                names.push(name);
            }
        }
        if long_format {
            if lines.is_empty() { String::new() } else { lines.join("\n") + "\n" }
        } else if names.is_empty() {
            "\n".to_string()
        } else {
            names.join("  ") + "\n"
        }
    }

    fn cmd_cat(&self, args: &[String]) -> ShellOutcome {
        if args.is_empty() {
            return ShellOutcome::err("cat: missing operand\n", 1);
        }
        let mut out = String::new();
        for path in args {
            match self.device.with_filesystem_ref(|fs| fs.read_file(path, &self.cwd)) {
                Ok(data) => out.push_str(&String::from_utf8_lossy(&data)),
                Err(e) => return ShellOutcome::err(format!("cat: {e}\n"), 1),
            }
        }
        ShellOutcome::ok(out)
    }

    fn cmd_echo(&self, args: &[String]) -> ShellOutcome {
        let mut newline = true;
        let mut words = Vec::new();
        for arg in args {
            if arg == "-n" {
                newline = false;
                continue;
            }
            words.push(arg.clone());
        }
        let mut text = words.join(" ");
        if newline {
            text.push('\n');
        }
        ShellOutcome::ok(text)
    }

    fn cmd_mkdir(&self, args: &[String]) -> ShellOutcome {
        if args.is_empty() {
            return ShellOutcome::err("mkdir: missing operand\n", 1);
        }
        let parents = args.iter().any(|a| a == "-p");
        for path in args.iter().filter(|a| *a != "-p") {
            if let Err(e) = self.device.with_filesystem_mut(|fs| fs.mkdir(path, &self.cwd, parents)) {
                return ShellOutcome::err(format!("mkdir: {e}\n"), 1);
            }
        }
        ShellOutcome::default()
    }

    fn cmd_rm(&self, args: &[String]) -> ShellOutcome {
        if args.is_empty() {
            return ShellOutcome::err("rm: missing operand\n", 1);
        }
        let recursive = args.iter().any(|a| a == "-r" || a == "-rf" || a == "-fr");
        let force = args.iter().any(|a| a == "-f" || a == "-rf" || a == "-fr");
        for path in args.iter().filter(|a| !a.starts_with('-')) {
            if let Err(e) = self.device.with_filesystem_mut(|fs| fs.remove(path, &self.cwd, recursive)) {
                if !force {
                    return ShellOutcome::err(format!("rm: {e}\n"), 1);
                }
            }
        }
        ShellOutcome::default()
    }

    fn cmd_cp(&self, args: &[String]) -> ShellOutcome {
        if args.len() < 2 {
            return ShellOutcome::err("cp: missing operand\n", 1);
        }
        let recursive = args.iter().any(|a| a == "-r");
        let filtered: Vec<&String> = args.iter().filter(|a| !a.starts_with('-')).collect();
        let Some((destination, sources)) = filtered.split_last() else {
            return ShellOutcome::err("cp: missing operand\n", 1);
        };
        for source in sources {
            if let Err(e) = self.device.with_filesystem_mut(|fs| fs.copy(source, destination, &self.cwd, recursive)) {
                return ShellOutcome::err(format!("cp: {e}\n"), 1);
            }
        }
        ShellOutcome::default()
    }

    fn cmd_mv(&self, args: &[String]) -> ShellOutcome {
        if args.len() < 2 {
            return ShellOutcome::err("mv: missing operand\n", 1);
        }
        let Some((destination, sources)) = args.split_last() else {
            return ShellOutcome::err("mv: missing operand\n", 1);
        };
        for source in sources {
            if let Err(e) = self.device.with_filesystem_mut(|fs| fs.rename(source, destination, &self.cwd)) {
                return ShellOutcome::err(format!("mv: {e}\n"), 1);
            }
        }
        ShellOutcome::default()
    }

    fn cmd_chmod(&self, args: &[String]) -> ShellOutcome {
        let Some((mode_text, paths)) = args.split_first() else {
            return ShellOutcome::err("chmod: missing operand\n", 1);
        };
        let Ok(mode) = u32::from_str_radix(mode_text, 8) else {
            return ShellOutcome::err("chmod: invalid mode\n", 1);
        };
        for path in paths {
            if let Err(e) = self.device.with_filesystem_mut(|fs| fs.set_permissions(path, &self.cwd, mode)) {
                return ShellOutcome::err(format!("chmod: {e}\n"), 1);
            }
        }
        ShellOutcome::default()
    }

    fn cmd_chown(&self, args: &[String]) -> ShellOutcome {
        let Some((owner_spec, paths)) = args.split_first() else {
            return ShellOutcome::err("chown: missing operand\n", 1);
        };
        let (owner, group) = match owner_spec.split_once(':') {
            Some((o, g)) => (o, Some(g)),
            None => (owner_spec.as_str(), None),
        };
        for path in paths {
            if let Err(e) = self.device.with_filesystem_mut(|fs| fs.set_owner(path, &self.cwd, owner, group)) {
                return ShellOutcome::err(format!("chown: {e}\n"), 1);
            }
        }
        ShellOutcome::default()
    }

    fn cmd_ps(&self) -> ShellOutcome {
        let mut out = "USER     PID   NAME\n".to_string();
        let rows: Vec<String> =
            self.device.list_processes().iter().map(|p| format!("{:<8} {:<5} {}", p.user, p.pid, p.name)).collect();
        if !rows.is_empty() {
            out.push_str(&rows.join("\n"));
            out.push('\n');
        }
        ShellOutcome::ok(out)
    }

    fn cmd_top(&self) -> ShellOutcome {
        let mut out = "PID   USER     CPU%   MEM%   COMMAND\n".to_string();
        let rows: Vec<String> = self
            .device
            .list_processes()
            .iter()
            .map(|p| format!("{:<5} {:<8} {:>4.1}   {:>4.1}   {}", p.pid, p.user, p.cpu, p.mem, p.name))
            .collect();
        if !rows.is_empty() {
            out.push_str(&rows.join("\n"));
            out.push('\n');
        }
        ShellOutcome::ok(out)
    }

    fn cmd_getprop(&self, args: &[String]) -> ShellOutcome {
        if args.is_empty() {
            let lines: Vec<String> =
                self.device.list_properties().iter().map(|(k, v)| format!("[{k}]: [{v}]")).collect();
            let mut out = lines.join("\n");
            if !lines.is_empty() {
                out.push('\n');
            }
            return ShellOutcome::ok(out);
        }
        ShellOutcome::ok(format!("{}\n", self.device.get_property(&args[0]).unwrap_or_default()))
    }

    fn cmd_setprop(&self, args: &[String]) -> ShellOutcome {
        if args.len() < 2 {
            return ShellOutcome::err("setprop: usage: setprop <key> <value>\n", 1);
        }
        self.device.set_property(&args[0], &args[1..].join(" "));
        ShellOutcome::default()
    }

    fn cmd_pm(&self, args: &[String]) -> ShellOutcome {
        let Some((sub, rest)) = args.split_first() else {
            return ShellOutcome::err("pm: missing command\n", 1);
        };
        match (sub.as_str(), rest) {
            ("list", rest) if rest.first().map(String::as_str) == Some("packages") => {
                let lines: Vec<String> =
                    self.device.list_packages().iter().map(|p| format!("package:{}", p.package)).collect();
                let mut out = lines.join("\n");
                if !lines.is_empty() {
                    out.push('\n');
                }
                ShellOutcome::ok(out)
            }
            ("path", [package, ..]) => self
                .device
                .list_packages()
                .iter()
                .find(|p| &p.package == package)
                .map(|p| ShellOutcome::ok(format!("package:{}\n", p.path)))
                .unwrap_or_else(|| ShellOutcome::err(format!("Package {package} not found\n"), 1)),
            ("install", rest) if !rest.is_empty() => {
                let name = self.device.install_package(rest.last().unwrap());
                ShellOutcome::ok(format!("Success: {name}\n"))
            }
            ("uninstall", [package, ..]) => {
                if self.device.uninstall_package(package) {
                    ShellOutcome::ok("Success\n")
                } else {
                    ShellOutcome::err("Failure [NOT_INSTALLED]\n", 1)
                }
            }
            (other, _) => ShellOutcome::err(format!("pm: unknown command {other}\n"), 1),
        }
    }

    fn cmd_logcat(&self) -> ShellOutcome {
        let lines = self.device.next_log_lines(50);
        let mut out = lines.join("\n");
        if !lines.is_empty() {
            out.push('\n');
        }
        ShellOutcome::ok(out)
    }

    fn cmd_am(&self, args: &[String]) -> ShellOutcome {
        let Some((sub, rest)) = args.split_first() else {
            return ShellOutcome::err("am: missing command\n", 1);
        };
        match (sub.as_str(), rest) {
            ("start", rest) if !rest.is_empty() => {
                let component = rest.last().unwrap();
                self.device.spawn_process(component, "u0a100");
                ShellOutcome::ok(format!("Starting: Intent {{ {component} }}\n"))
            }
            ("broadcast", rest) if !rest.is_empty() => {
                ShellOutcome::ok(format!("Broadcast completed: {}\n", rest.last().unwrap()))
            }
            (other, _) => ShellOutcome::err(format!("am: unknown command {other}\n"), 1),
        }
    }
}

/// Minimal shell-word splitter: whitespace-separated, with single and
/// double quoting. Good enough for the fixed builtin set above; this is
/// not a general shell grammar.
fn shell_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    for ch in line.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
