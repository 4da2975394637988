//! Block handler trait.

use crate::types::Block;

/// Receives each decoded block, in order, one at a time.
///
/// Called synchronously from the session loop: the next event is not
/// accepted until `on_block` returns. Ownership of the block passes to the
/// handler; the engine keeps no reference to it.
pub trait BlockHandler: Send {
    fn on_block(&mut self, block: Block);
}

/// Blanket impl so closures can be used as handlers.
impl<F: FnMut(Block) + Send> BlockHandler for F {
    fn on_block(&mut self, block: Block) {
        self(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_is_a_handler() {
        let mut seen = Vec::new();
        {
            let mut handler = |block: Block| seen.push(block.number);
            handler.on_block(Block {
                number: 7,
                ..Default::default()
            });
        }
        assert_eq!(seen, vec![7]);
    }
}
