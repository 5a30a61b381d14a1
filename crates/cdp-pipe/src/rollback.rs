use cdp_pipe_core::{PipeError, Result};
use std::fmt;
use std::fs::File;
use tracing::debug;

/// The four pipe endpoints of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    /// Parent's write end of the to-child pipe.
    ParentWrite,
    /// Child's read end of the to-child pipe.
    ChildRead,
    /// Child's write end of the from-child pipe.
    ChildWrite,
    /// Parent's read end of the from-child pipe.
    ParentRead,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Endpoint::ParentWrite => "parent write",
            Endpoint::ChildRead => "child read",
            Endpoint::ChildWrite => "child write",
            Endpoint::ParentRead => "parent read",
        };
        f.write_str(name)
    }
}

/// Endpoints owned by a launch that has not handed them off yet.
///
/// Whatever is still registered when the list is dropped gets closed, so an
/// early `?` return anywhere in the launch releases every endpoint acquired
/// so far. Endpoints leave the list through [`Rollback::take`] once their
/// new owner (the child or the transport) is settled.
#[derive(Default)]
pub(crate) struct Rollback {
    endpoints: Vec<(Endpoint, File)>,
}

impl Rollback {
    pub(crate) fn register(&mut self, endpoint: Endpoint, file: File) {
        self.endpoints.push((endpoint, file));
    }

    pub(crate) fn get(&self, endpoint: Endpoint) -> Result<&File> {
        self.endpoints
            .iter()
            .find(|(registered, _)| *registered == endpoint)
            .map(|(_, file)| file)
            .ok_or_else(|| missing(endpoint))
    }

    pub(crate) fn take(&mut self, endpoint: Endpoint) -> Result<File> {
        let index = self
            .endpoints
            .iter()
            .position(|(registered, _)| *registered == endpoint)
            .ok_or_else(|| missing(endpoint))?;
        Ok(self.endpoints.remove(index).1)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Close an endpoint whose copy now lives in the child.
    pub(crate) fn release_to_child(&mut self, endpoint: Endpoint) -> Result<()> {
        drop(self.take(endpoint)?);
        debug!(%endpoint, "Released endpoint to child");
        Ok(())
    }

    /// Mark the launch successful. Anything left over is still closed.
    pub(crate) fn commit(mut self) {
        for (endpoint, _) in &self.endpoints {
            debug!(%endpoint, "Endpoint left unclaimed at commit");
        }
        self.endpoints.clear();
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        for (endpoint, file) in self.endpoints.drain(..) {
            drop(file);
            debug!(%endpoint, "Closed endpoint after failed launch");
        }
    }
}

fn missing(endpoint: Endpoint) -> PipeError {
    PipeError::Other(anyhow::anyhow!("{endpoint} endpoint is not owned by this launch"))
}
