/// Output of a single reduction: the next state plus the effects to publish
/// and the commands to hand to the actor, both in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S, Ef, C> {
    pub state: S,
    pub effects: Vec<Ef>,
    pub commands: Vec<C>,
}

impl<S, Ef, C> Transition<S, Ef, C> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            effects: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: Ef) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Ef>) -> Self {
        self.effects.extend(effects);
        self
    }

    pub fn with_command(mut self, command: C) -> Self {
        self.commands.push(command);
        self
    }

    /// Push `command` only when it is `Some`.
    pub fn with_command_opt(mut self, command: Option<C>) -> Self {
        self.commands.extend(command);
        self
    }

    pub fn with_commands(mut self, commands: impl IntoIterator<Item = C>) -> Self {
        self.commands.extend(commands);
        self
    }
}

impl<S, Ef, C> From<S> for Transition<S, Ef, C> {
    fn from(state: S) -> Self {
        Self::new(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_has_no_effects_or_commands() {
        let t: Transition<u32, (), ()> = Transition::new(7);
        assert_eq!(t.state, 7);
        assert!(t.effects.is_empty());
        assert!(t.commands.is_empty());
    }

    #[test]
    fn single_command_matches_one_element_sequence() {
        let single: Transition<u32, (), &str> = Transition::new(1).with_command("load");
        let many: Transition<u32, (), &str> = Transition::new(1).with_commands(["load"]);
        assert_eq!(single, many);
    }

    #[test]
    fn effects_keep_duplicates_in_order() {
        let t: Transition<(), i32, ()> = Transition::new(())
            .with_effect(1)
            .with_effect(1)
            .with_effects([2, 1]);
        assert_eq!(t.effects, vec![1, 1, 2, 1]);
    }

    #[test]
    fn optional_command_is_skipped_when_none() {
        let t: Transition<(), (), i32> = Transition::new(())
            .with_command_opt(None)
            .with_command_opt(Some(3));
        assert_eq!(t.commands, vec![3]);
    }
}
