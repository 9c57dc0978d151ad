use std::collections::HashMap;

/// Per-connection registries for the Extended Query Protocol.
///
/// Both maps use `""` as the unnamed entry. Registering under an existing
/// name replaces the previous entry; a portal owns its bound statement
/// outright, so replacing a prepared statement never invalidates portals
/// bound from it earlier.
#[derive(Debug)]
pub struct SessionState<S> {
    /// Named prepared statements. Key "" is the unnamed statement.
    statements: HashMap<String, S>,
    /// Named portals. Key "" is the unnamed portal.
    portals: HashMap<String, S>,
    /// Error recovery flag. When true, inbound frames are discarded until
    /// the next Sync.
    pub ignore_until_sync: bool,
}

impl<S> Default for SessionState<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SessionState<S> {
    /// Create a new connection state.
    pub fn new() -> Self {
        Self {
            statements: HashMap::new(),
            portals: HashMap::new(),
            ignore_until_sync: false,
        }
    }

    /// Store a prepared statement, replacing any existing one with the same
    /// name.
    pub fn put_statement(&mut self, name: String, stmt: S) {
        self.statements.insert(name, stmt);
    }

    /// Get a prepared statement by name.
    pub fn statement(&self, name: &str) -> Option<&S> {
        self.statements.get(name)
    }

    /// Close a prepared statement. Closing an absent name is a no-op.
    pub fn close_statement(&mut self, name: &str) {
        self.statements.remove(name);
    }

    /// Store a portal, replacing any existing one with the same name.
    pub fn put_portal(&mut self, name: String, portal: S) {
        self.portals.insert(name, portal);
    }

    /// Get a portal by name.
    pub fn portal(&self, name: &str) -> Option<&S> {
        self.portals.get(name)
    }

    /// Close a portal. Closing an absent name is a no-op.
    pub fn close_portal(&mut self, name: &str) {
        self.portals.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_lifecycle() {
        let mut state: SessionState<u32> = SessionState::new();

        state.put_statement("test".to_string(), 1);

        assert_eq!(state.statement("test"), Some(&1));
        assert!(state.statement("nonexistent").is_none());

        state.close_statement("test");
        assert!(state.statement("test").is_none());

        // Closing again is a silent no-op
        state.close_statement("test");
    }

    #[test]
    fn test_unnamed_entry_replacement() {
        let mut state: SessionState<u32> = SessionState::new();

        state.put_statement(String::new(), 1);
        state.put_statement(String::new(), 2);
        assert_eq!(state.statement(""), Some(&2));

        state.put_portal(String::new(), 10);
        state.put_portal(String::new(), 20);
        assert_eq!(state.portal(""), Some(&20));
    }

    #[test]
    fn test_statement_replacement_keeps_portals() {
        let mut state: SessionState<u32> = SessionState::new();

        state.put_statement("stmt".to_string(), 1);
        state.put_portal("portal".to_string(), 1);

        // A portal owns its bound statement; re-parsing the source name
        // must not invalidate it.
        state.put_statement("stmt".to_string(), 2);
        assert_eq!(state.portal("portal"), Some(&1));
    }

    #[test]
    fn test_registries_are_independent() {
        let mut state: SessionState<u32> = SessionState::new();

        state.put_statement("x".to_string(), 1);
        state.put_portal("x".to_string(), 2);

        assert_eq!(state.statement("x"), Some(&1));
        assert_eq!(state.portal("x"), Some(&2));

        state.close_statement("x");
        assert_eq!(state.portal("x"), Some(&2));
    }
}
