//! Validation policy: which modules, builtins and functions are off limits
//!
//! Every list can be overridden from the `[validation]` table of the runner
//! configuration. Fields that are omitted keep their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Block and allow lists consulted by the [`crate::Validator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Modules that may not be imported (exact or dotted-prefix match)
    pub blocked_modules: Vec<String>,

    /// Builtins that may not be called or referenced by bare name
    pub blocked_builtins: Vec<String>,

    /// Dotted call targets that may not be called or referenced
    pub blocked_functions: Vec<String>,

    /// Modules that are always importable, even below a blocked prefix
    pub allowed_modules: Vec<String>,

    /// Installed third-party packages that are not sibling scripts
    pub third_party_modules: Vec<String>,

    /// Attribute names that give access to interpreter internals
    pub suspicious_attributes: Vec<String>,

    /// Directories file operations may touch. Empty means the scripts dir.
    pub allowed_paths: Vec<PathBuf>,
}

impl ValidationPolicy {
    /// Whether `module` is importable under this policy
    pub fn is_blocked_module(&self, module: &str) -> bool {
        if module.is_empty() {
            return false;
        }

        if self
            .allowed_modules
            .iter()
            .any(|allowed| matches_prefix(module, allowed))
        {
            return false;
        }

        self.blocked_modules
            .iter()
            .any(|blocked| matches_prefix(module, blocked))
    }

    /// Whether `name` is a blocked builtin
    pub fn is_blocked_builtin(&self, name: &str) -> bool {
        self.blocked_builtins.iter().any(|b| b == name)
    }

    /// Whether the dotted `name` is a blocked function
    pub fn is_blocked_function(&self, name: &str) -> bool {
        self.blocked_functions.iter().any(|f| f == name)
    }

    /// Whether `attr` is a dunder attribute that exposes interpreter internals
    pub fn is_suspicious_attribute(&self, attr: &str) -> bool {
        self.suspicious_attributes.iter().any(|a| a == attr)
    }

    /// Whether `module` names something installed on the host rather than a
    /// sibling script
    pub fn is_known_package(&self, module: &str) -> bool {
        self.third_party_modules.iter().any(|m| m == module)
            || self
                .allowed_modules
                .iter()
                .any(|allowed| matches_prefix(module, allowed))
    }
}

/// Exact match, or `candidate` lives below the dotted `prefix`
fn matches_prefix(candidate: &str, prefix: &str) -> bool {
    candidate == prefix
        || candidate
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            blocked_modules: strings(&[
                // Network
                "socket",
                "socketserver",
                "ssl",
                "urllib",
                "http",
                "ftplib",
                "poplib",
                "imaplib",
                "smtplib",
                "telnetlib",
                "xmlrpc",
                "ipaddress",
                "asyncio",
                "aiohttp",
                "requests",
                "httpx",
                "urllib3",
                "websocket",
                "websockets",
                "paramiko",
                "fabric",
                "pycurl",
                "tornado",
                "twisted",
                "flask",
                "django",
                "fastapi",
                "bottle",
                "cherrypy",
                // Databases
                "sqlite3",
                "dbm",
                "shelve",
                "psycopg2",
                "pymysql",
                "mysql",
                "pymongo",
                "redis",
                "sqlalchemy",
                "peewee",
                "cx_Oracle",
                "pyodbc",
                // Subprocesses
                "subprocess",
                "popen2",
                "commands",
                "pexpect",
                "pty",
                // Code execution and import machinery
                "importlib",
                "imp",
                "runpy",
                "code",
                "codeop",
                "compileall",
                "py_compile",
                "ast",
                "dis",
                "inspect",
                "types",
                // Process and system control
                "multiprocessing",
                "concurrent",
                "_thread",
                "threading",
                "sched",
                "resource",
                "sysconfig",
                "platform",
                "ctypes",
                "cffi",
                // Serialization
                "pickle",
                "cPickle",
                "marshal",
                "dill",
                "cloudpickle",
            ]),
            blocked_builtins: strings(&[
                "eval",
                "exec",
                "compile",
                "__import__",
                "globals",
                "locals",
                "vars",
                "dir",
                "getattr",
                "setattr",
                "delattr",
                "hasattr",
                "breakpoint",
                "memoryview",
                "bytearray",
            ]),
            blocked_functions: strings(&[
                "os.system",
                "os.popen",
                "os.spawn",
                "os.spawnl",
                "os.spawnle",
                "os.spawnlp",
                "os.spawnlpe",
                "os.spawnv",
                "os.spawnve",
                "os.spawnvp",
                "os.spawnvpe",
                "os.exec",
                "os.execl",
                "os.execle",
                "os.execlp",
                "os.execlpe",
                "os.execv",
                "os.execve",
                "os.execvp",
                "os.execvpe",
                "os.fork",
                "os.forkpty",
                "os.kill",
                "os.killpg",
                "os.plock",
                "os.startfile",
            ]),
            allowed_modules: strings(&[
                "RPi",
                "gpiozero",
                "pigpio",
                "RPIO",
                "wiringpi",
                "spidev",
                "smbus",
                "smbus2",
            ]),
            third_party_modules: strings(&["numpy", "PIL", "cv2", "pygame", "serial", "board"]),
            suspicious_attributes: strings(&[
                "__class__",
                "__bases__",
                "__mro__",
                "__subclasses__",
                "__globals__",
                "__code__",
                "__builtins__",
                "__import__",
                "__getattribute__",
                "__reduce__",
                "__reduce_ex__",
            ]),
            allowed_paths: Vec::new(),
        }
    }
}
