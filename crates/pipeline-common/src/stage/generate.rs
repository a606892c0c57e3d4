use dat_protocol::MessageType;
use tracing::debug;

use super::{Route, drain, emit_error, route};
use crate::plugin::Generator;
use crate::{PipelineError, Processor};

const STAGE: &str = "generate";

/// Applies a [`Generator`] to every `RECORD` line.
///
/// Output of the generator is written as it is produced. A generator failure
/// ends the output for that input line only; the stage moves on to the next
/// line. A `RECORD` line that does not decode ends the stage: after its
/// `LOG`/`ERROR` message every further input line is ignored.
pub struct GenerateStage {
    generator: Box<dyn Generator>,
    records: usize,
    failures: usize,
    aborted: bool,
}

impl GenerateStage {
    pub fn new(generator: Box<dyn Generator>) -> Self {
        Self {
            generator,
            records: 0,
            failures: 0,
            aborted: false,
        }
    }
}

impl Processor<String> for GenerateStage {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn process(
        &mut self,
        line: String,
        output: &mut dyn FnMut(String) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError> {
        if self.aborted {
            return Ok(());
        }
        let message = match route(&line, MessageType::Record) {
            Route::Drop => return Ok(()),
            Route::PassThrough => return output(line),
            Route::Target(Ok(message)) => message,
            Route::Target(Err(e)) => {
                self.failures += 1;
                self.aborted = true;
                return emit_error(STAGE, &e, output);
            }
        };

        self.records += 1;
        let drained = drain(STAGE, self.generator.generate(message), output)?;
        if drained.failed {
            self.failures += 1;
        }
        Ok(())
    }

    fn finish(
        &mut self,
        _output: &mut dyn FnMut(String) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError> {
        debug!(
            records = self.records,
            failures = self.failures,
            aborted = self.aborted,
            "Generate stage finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{EchoGenerator, record_line, run_processor};
    use dat_protocol::{Level, Message};

    fn stage(copies: usize, fail_on: Option<i64>) -> GenerateStage {
        GenerateStage::new(Box::new(EchoGenerator { copies, fail_on }))
    }

    #[test]
    fn every_output_line_is_a_message() {
        let mut stage = stage(2, None);
        let (out, result) =
            run_processor(&mut stage, vec![record_line("a", 1), record_line("a", 2)]);
        result.unwrap();
        assert_eq!(out.len(), 4);
        for line in &out {
            assert!(Message::from_line(line).is_ok(), "invalid line: {line}");
        }
    }

    #[test]
    fn non_record_lines_are_echoed_verbatim() {
        let mut stage = stage(1, None);
        let lines = vec![
            r#"{"type":"LOG","log":{"level":"INFO","message":"x"}}"#.to_string(),
            r#"{ "type" : "CONNECTION_STATUS", "connection_status": {"status":"SUCCEEDED"} }"#
                .to_string(),
            r#"{"type":"CUSTOM","payload":[1,2,3]}"#.to_string(),
        ];
        let (out, result) = run_processor(&mut stage, lines.clone());
        result.unwrap();
        assert_eq!(out, lines);
    }

    #[test]
    fn malformed_json_produces_nothing() {
        let mut stage = stage(1, None);
        let (out, result) = run_processor(
            &mut stage,
            vec!["".to_string(), "{\"type\":".to_string(), "plain text".to_string()],
        );
        result.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn failure_ends_output_for_that_line_only() {
        let mut stage = stage(1, Some(2));
        let (out, result) = run_processor(
            &mut stage,
            vec![record_line("a", 1), record_line("a", 2), record_line("a", 3)],
        );
        result.unwrap();

        let messages: Vec<Message> =
            out.iter().map(|l| Message::from_line(l).unwrap()).collect();
        // record 1, record 2 before the failure, the error, record 3
        assert_eq!(messages.len(), 4);
        let log = messages[2].as_log().unwrap();
        assert_eq!(log.level, Level::Error);
        assert_eq!(log.message, "Generator error: cannot expand record 2");
        assert!(messages[3].as_record().is_some());
        assert_eq!(stage.failures, 1);
        assert_eq!(stage.records, 3);
    }

    #[test]
    fn undecodable_record_ends_the_stage() {
        let mut stage = stage(1, None);
        let (out, result) = run_processor(
            &mut stage,
            vec![
                record_line("a", 1),
                r#"{"type":"RECORD","record":"not an object"}"#.to_string(),
                record_line("a", 7),
                r#"{"type":"LOG","log":{"level":"INFO","message":"late"}}"#.to_string(),
            ],
        );
        result.unwrap();

        // record 1, then the error; nothing after it
        assert_eq!(out.len(), 2);
        assert!(Message::from_line(&out[0]).unwrap().as_record().is_some());
        let log = Message::from_line(&out[1]).unwrap();
        assert_eq!(log.as_log().unwrap().level, Level::Error);
        assert_eq!(stage.records, 1);
        assert!(stage.aborted);
    }
}
