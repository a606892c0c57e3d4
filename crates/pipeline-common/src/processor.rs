use crate::PipelineError;

/// A single pipeline stage.
///
/// `process` is called once per input item and may emit any number of items
/// through `output`; `finish` is called once after the input is exhausted so
/// buffering stages can flush what they still hold.
pub trait Processor<T>: Send {
    /// Short stage name used in logs and errors.
    fn name(&self) -> &'static str;

    fn process(
        &mut self,
        input: T,
        output: &mut dyn FnMut(T) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError>;

    fn finish(
        &mut self,
        output: &mut dyn FnMut(T) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError>;
}
