use std::collections::HashMap;
use std::io;
use std::path::Path;

pub const PASSWD: &str = "/etc/passwd";

/// uid to login name table read from a passwd(5) file.
#[derive(Debug, Default, Clone)]
pub struct UserNames {
    names: HashMap<u32, String>,
}

impl UserNames {
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn parse(content: &str) -> Self {
        let mut names = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split(':');
            let (Some(name), Some(_), Some(uid)) = (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            if let Ok(uid) = uid.parse::<u32>() {
                // first entry wins, like getpwuid
                names.entry(uid).or_insert_with(|| name.to_string());
            }
        }
        UserNames { names }
    }

    pub fn name(&self, uid: u32) -> Option<&str> {
        self.names.get(&uid).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
