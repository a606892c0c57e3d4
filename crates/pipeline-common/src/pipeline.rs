//! # Synchronous Pipeline
//!
//! Chains processors in the calling thread. This is what a stage process runs:
//! one blocking read-process-write loop over stdin and stdout, with no
//! internal parallelism.
//!
//! ## Usage
//!
//! Create a new `Pipeline<T>`, add processors implementing `Processor<T>`,
//! then feed it an input iterator (or, for protocol lines, a reader).
//!

use std::io::{BufRead, Write};

use crate::{LineReader, PipelineError, Processor, write_line};

/// A generic pipeline for processing data through a series of processors.
///
/// Each processor receives the outputs of the previous one in the chain.
pub struct Pipeline<T> {
    processors: Vec<Box<dyn Processor<T>>>,
}

impl<T> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pipeline<T> {
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    /// Add a processor to the end of the pipeline.
    ///
    /// Returns self for method chaining.
    pub fn add_processor<P: Processor<T> + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Process all input through the pipeline.
    ///
    /// Stops at the first input error or processor error. Processors are
    /// finished in order once the input is exhausted, so output a processor
    /// emits from `finish` still flows through the rest of the chain.
    pub fn process<I, O>(mut self, input: I, output: &mut O) -> Result<(), PipelineError>
    where
        I: Iterator<Item = Result<T, PipelineError>>,
        O: FnMut(T) -> Result<(), PipelineError>,
    {
        fn process_inner<T>(
            processors: &mut [Box<dyn Processor<T>>],
            data: T,
            output: &mut dyn FnMut(T) -> Result<(), PipelineError>,
        ) -> Result<(), PipelineError> {
            if let Some((first, rest)) = processors.split_first_mut() {
                let mut intermediate_output = |data| process_inner(rest, data, output);
                first.process(data, &mut intermediate_output)
            } else {
                output(data)
            }
        }

        for item in input {
            process_inner(&mut self.processors, item?, output)?;
        }

        let mut processors = &mut self.processors[..];
        while let Some((current, rest)) = processors.split_first_mut() {
            let mut output_fn = |data: T| process_inner(rest, data, output);
            current.finish(&mut output_fn)?;
            processors = rest;
        }
        Ok(())
    }
}

impl Pipeline<String> {
    /// Run over newline-delimited input, writing every output line to `writer`
    /// as soon as it is produced.
    pub fn run_lines<R, W>(self, reader: R, writer: &mut W) -> Result<(), PipelineError>
    where
        R: BufRead,
        W: Write + ?Sized,
    {
        let input = LineReader::new(reader).map(|line| line.map_err(PipelineError::from));
        let mut output = |line: String| write_line(writer, &line).map_err(PipelineError::from);
        self.process(input, &mut output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{EchoGenerator, RecordingDestination, record_line};
    use crate::{GenerateStage, WriteStage};
    use dat_protocol::{Catalog, Message};

    struct Suffix(&'static str);

    impl Processor<String> for Suffix {
        fn name(&self) -> &'static str {
            "suffix"
        }

        fn process(
            &mut self,
            input: String,
            output: &mut dyn FnMut(String) -> Result<(), PipelineError>,
        ) -> Result<(), PipelineError> {
            output(format!("{input}{}", self.0))
        }

        fn finish(
            &mut self,
            output: &mut dyn FnMut(String) -> Result<(), PipelineError>,
        ) -> Result<(), PipelineError> {
            output(format!("end{}", self.0))
        }
    }

    #[test]
    fn chains_processors_and_finishes_in_order() {
        let pipeline = Pipeline::new().add_processor(Suffix("-a")).add_processor(Suffix("-b"));
        let mut out = Vec::new();
        let mut output = |s: String| {
            out.push(s);
            Ok::<(), PipelineError>(())
        };
        pipeline
            .process(vec![Ok("x".to_string())].into_iter(), &mut output)
            .unwrap();
        // finish output of the first processor flows through the second
        assert_eq!(out, vec!["x-a-b", "end-a-b", "end-b"]);
    }

    #[test]
    fn input_error_stops_the_pipeline() {
        let pipeline = Pipeline::new().add_processor(Suffix("-a"));
        let input = vec![
            Ok("x".to_string()),
            Err(PipelineError::ChannelClosed("upstream")),
            Ok("y".to_string()),
        ];
        let mut seen = 0;
        let mut output = |_s: String| {
            seen += 1;
            Ok::<(), PipelineError>(())
        };
        let result = pipeline.process(input.into_iter(), &mut output);
        assert!(matches!(result, Err(PipelineError::ChannelClosed("upstream"))));
        assert_eq!(seen, 1);
    }

    #[test]
    fn generate_then_write_over_lines() {
        let destination = RecordingDestination::default();
        let pipeline = Pipeline::new()
            .add_processor(GenerateStage::new(Box::new(EchoGenerator {
                copies: 2,
                fail_on: None,
            })))
            .add_processor(WriteStage::with_batch_size(
                Box::new(destination.clone()),
                Catalog::default(),
                3,
            ));

        let input = format!(
            "{}\nnoise\n{}\n",
            record_line("a", 1),
            record_line("a", 2)
        );
        let mut out = Vec::new();
        pipeline.run_lines(input.as_bytes(), &mut out).unwrap();

        assert_eq!(destination.batch_sizes(), vec![3, 1]);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            assert!(Message::from_line(line).unwrap().as_log().is_some());
        }
    }
}
