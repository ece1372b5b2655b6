use std::time::Duration;

/// One mutation inside an atomic batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    SetAdd { key: String, member: String },
    SetRemove { key: String, member: String },
    Delete { key: String },
    Expire { key: String, ttl: Duration },
}

/// An ordered group of mutations the store applies atomically.
///
/// Either every command takes effect and observers see the complete result,
/// or the whole batch fails. Maps onto whatever transaction or pipeline
/// primitive the backing store offers.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_add(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.commands.push(Command::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn set_remove(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.commands.push(Command::SetRemove {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.commands.push(Command::Delete { key: key.into() });
        self
    }

    pub fn expire(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.commands.push(Command::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}
