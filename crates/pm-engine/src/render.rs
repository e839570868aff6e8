//! Hand-off point for finalized artifacts.

use pm_core::Result;

use crate::artifact::Artifact;

/// Receives every finalized artifact of a run, in request order.
pub trait Renderer {
    fn render(&mut self, artifact: &Artifact) -> Result<()>;

    /// Called once after the last artifact.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects artifacts in memory.
impl Renderer for Vec<Artifact> {
    fn render(&mut self, artifact: &Artifact) -> Result<()> {
        self.push(artifact.clone());
        Ok(())
    }
}
