//! Typed block programs
//!
//! A program is a forest: every compound block owns its body. Parameters
//! have already been checked and resolved by the loader, so the engine never
//! looks at untyped data.

use crate::traits::JointTarget;

/// One instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Unique id within the program
    pub id: String,
    /// What the block does
    pub kind: BlockKind,
}

/// Instruction variants
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    /// Move one or more joints together
    Move { targets: Vec<JointTarget> },
    /// Home the arm
    Home,
    OpenGripper,
    CloseGripper,
    /// Pause (ms)
    Wait { millis: u32 },
    /// Run the body `times` times
    Repeat { times: u32, body: Vec<Block> },
    /// Run the body once if `condition` holds
    If { condition: bool, body: Vec<Block> },
    /// Run the body while `condition` holds
    ///
    /// The condition is a literal fixed when the program was written, so
    /// this runs the body at most once.
    While { condition: bool, body: Vec<Block> },
}

impl BlockKind {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Move { .. } => "move",
            BlockKind::Home => "home",
            BlockKind::OpenGripper => "open_gripper",
            BlockKind::CloseGripper => "close_gripper",
            BlockKind::Wait { .. } => "wait",
            BlockKind::Repeat { .. } => "repeat",
            BlockKind::If { .. } => "if",
            BlockKind::While { .. } => "while",
        }
    }

    /// Child blocks (empty for leaves)
    pub fn body(&self) -> &[Block] {
        match self {
            BlockKind::Repeat { body, .. }
            | BlockKind::If { body, .. }
            | BlockKind::While { body, .. } => body,
            _ => &[],
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            BlockKind::Repeat { .. } | BlockKind::If { .. } | BlockKind::While { .. }
        )
    }
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Move a single joint
    pub fn move_joint(id: impl Into<String>, servo_id: u8, degrees: f32) -> Self {
        Self::new(
            id,
            BlockKind::Move {
                targets: vec![JointTarget::new(servo_id, degrees)],
            },
        )
    }

    pub fn wait(id: impl Into<String>, millis: u32) -> Self {
        Self::new(id, BlockKind::Wait { millis })
    }

    pub fn repeat(id: impl Into<String>, times: u32, body: Vec<Block>) -> Self {
        Self::new(id, BlockKind::Repeat { times, body })
    }
}

/// Ordered sequence of root blocks
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub blocks: Vec<Block>,
}

impl Program {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Number of root blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total blocks at every depth
    pub fn block_count(&self) -> usize {
        fn count(blocks: &[Block]) -> usize {
            blocks.iter().map(|b| 1 + count(b.kind.body())).sum()
        }
        count(&self.blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_and_counts() {
        let program = Program::new(vec![
            Block::move_joint("a", 1, 90.0),
            Block::repeat(
                "r",
                3,
                vec![Block::wait("w", 10), Block::new("g", BlockKind::OpenGripper)],
            ),
        ]);

        assert_eq!(program.len(), 2);
        assert_eq!(program.block_count(), 4);
        assert!(program.blocks[1].kind.is_compound());
        assert_eq!(program.blocks[1].kind.body().len(), 2);
        assert!(program.blocks[0].kind.body().is_empty());
        assert_eq!(program.blocks[0].kind.name(), "move");
    }
}
