//! Consumer contracts for materialized top-level objects.

use rowgraph_core::{Datum, Result};

/// What a consumer sees for each top-level object.
#[derive(Debug)]
pub struct ResultContext {
    object: Datum,
    count: usize,
    stopped: bool,
}

impl ResultContext {
    pub fn new() -> Self {
        Self {
            object: Datum::null(),
            count: 0,
            stopped: false,
        }
    }

    /// Advance to the next object.
    pub(crate) fn next(&mut self, object: Datum) {
        self.object = object;
        self.count += 1;
    }

    /// The object just materialized.
    pub fn object(&self) -> &Datum {
        &self.object
    }

    /// Take ownership of the current object, leaving NULL behind.
    pub fn take_object(&mut self) -> Datum {
        std::mem::replace(&mut self.object, Datum::null())
    }

    /// How many objects have been handed out so far, this one included.
    pub fn result_count(&self) -> usize {
        self.count
    }

    /// Ask the pass to end after this object.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Default for ResultContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives top-level objects in output order.
pub trait ResultHandler {
    fn handle_result(&mut self, context: &mut ResultContext) -> Result<()>;
}

impl<F> ResultHandler for F
where
    F: FnMut(&mut ResultContext) -> Result<()>,
{
    fn handle_result(&mut self, context: &mut ResultContext) -> Result<()> {
        self(context)
    }
}

/// Collects every object into a list.
#[derive(Debug, Default)]
pub struct DefaultResultHandler {
    results: Vec<Datum>,
}

impl DefaultResultHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[Datum] {
        &self.results
    }

    pub fn into_results(self) -> Vec<Datum> {
        self.results
    }
}

impl ResultHandler for DefaultResultHandler {
    fn handle_result(&mut self, context: &mut ResultContext) -> Result<()> {
        self.results.push(context.take_object());
        Ok(())
    }
}
