//! Extension point for slash commands beyond the built-ins the Agent
//! Console handles directly. The command registry itself is named in the
//! specification's list of external collaborators — this module is the
//! narrow trait boundary for it, mirroring the `name`/`description`/
//! `execute` shape the spec calls for.

/// A single registered slash command.
pub trait Command: Send + Sync {
    fn name(&self) -> &str;
    fn aliases(&self) -> &[&str] {
        &[]
    }
    fn description(&self) -> &str;
    fn execute(&self, args: &str) -> String;
}

/// Looks commands up by name or alias, first match wins, registration
/// order otherwise undefined.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        self.commands.push(command);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Command> {
        self.commands
            .iter()
            .find(|c| c.name() == name || c.aliases().contains(&name))
            .map(|c| c.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Command for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn aliases(&self) -> &[&str] {
            &["e"]
        }
        fn description(&self) -> &str {
            "echoes its arguments"
        }
        fn execute(&self, args: &str) -> String {
            args.to_string()
        }
    }

    #[test]
    fn registered_command_is_found_by_name_and_alias() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(Echo));
        assert!(registry.find("echo").is_some());
        assert!(registry.find("e").is_some());
        assert!(registry.find("nope").is_none());
    }

    #[test]
    fn found_command_executes_with_its_arguments() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(Echo));
        let output = registry.find("echo").expect("registered").execute("hi there");
        assert_eq!(output, "hi there");
    }
}
