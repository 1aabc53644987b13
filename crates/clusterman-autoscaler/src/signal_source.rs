//! `SignalSource`: the abstraction the loop evaluates each tick,
//! implemented by the real `clusterman_signal::Signal` and by a test
//! double so `evaluate`/`compute_target_capacity` are unit-testable
//! without a live subprocess (the "simulation harness" conformance
//! target named in §1).

use clusterman_core::ResourceRequest;

#[async_trait::async_trait]
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;
    async fn evaluate(&mut self, now_unix: i64) -> anyhow::Result<ResourceRequest>;
}

#[async_trait::async_trait]
impl SignalSource for clusterman_signal::Signal {
    fn name(&self) -> &str {
        clusterman_signal::Signal::name(self)
    }

    async fn evaluate(&mut self, now_unix: i64) -> anyhow::Result<ResourceRequest> {
        Ok(clusterman_signal::Signal::evaluate(self, now_unix).await?)
    }
}

/// A canned signal for tests: returns a fixed sequence of results (or
/// errors), one per call, repeating the last entry once exhausted.
pub struct StaticSignalSource {
    name: String,
    responses: Vec<anyhow::Result<ResourceRequest>>,
    index: usize,
}

impl StaticSignalSource {
    pub fn new(name: impl Into<String>, responses: Vec<anyhow::Result<ResourceRequest>>) -> Self {
        Self {
            name: name.into(),
            responses,
            index: 0,
        }
    }

    pub fn always_failing(name: impl Into<String>) -> Self {
        Self::new(name, vec![Err(anyhow::anyhow!("signal failed"))])
    }

    pub fn always_returning(name: impl Into<String>, request: ResourceRequest) -> Self {
        Self::new(name, vec![Ok(request)])
    }
}

#[async_trait::async_trait]
impl SignalSource for StaticSignalSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&mut self, _now_unix: i64) -> anyhow::Result<ResourceRequest> {
        let i = self.index.min(self.responses.len() - 1);
        self.index += 1;
        match &self.responses[i] {
            Ok(req) => Ok(*req),
            Err(e) => Err(anyhow::anyhow!("{e}")),
        }
    }
}
