use crate::linker::{Autolinker, LinkContext, LinkDecision};
use crate::types::EdgeFlags;
use std::fmt;

/// The autolinkers registered with one engine.
#[derive(Default)]
pub struct LinkerRegistry {
    linkers: Vec<Box<dyn Autolinker>>,
}

impl LinkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, linker: Box<dyn Autolinker>) {
        self.linkers.push(linker);
    }

    pub fn len(&self) -> usize {
        self.linkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.linkers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.linkers.iter().map(|l| l.name()).collect()
    }

    /// Ask every linker about one ordered pair and fold the answers.
    ///
    /// Engine-owned bits a linker tries to set are stripped; linkers only
    /// contribute caller flags.
    pub fn evaluate(&self, ctx: &LinkContext<'_>) -> LinkDecision {
        let mut decision = LinkDecision::NotWanted;
        for linker in &self.linkers {
            let answer = linker.check(ctx);
            if let LinkDecision::Wanted(flags) = answer {
                if flags.intersects(EdgeFlags::SOURCE_MASK) {
                    log::warn!(
                        "Autolinker '{}' returned engine-reserved flags {:?}; ignoring them",
                        linker.name(),
                        flags
                    );
                }
                decision = decision.combine(LinkDecision::Wanted(flags.user_bits()));
            }
        }
        decision
    }
}

impl fmt::Debug for LinkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
