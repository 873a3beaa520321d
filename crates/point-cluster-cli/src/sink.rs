use point_cluster_lib::{PopupContent, RenderInstruction, RenderSink, Result};
use serde::Serialize;
use std::io::Write;

/// One printed instruction
#[derive(Serialize)]
struct OutputLine<'a> {
    frame: usize,
    #[serde(flatten)]
    instruction: &'a RenderInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    popup: Option<String>,
}

/// Writes every instruction as one JSON object per line
///
/// Adds and updates carry the popup HTML of their node.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    frame: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, frame: 0 }
    }

    /// Set the frame number stamped on the following lines
    pub fn set_frame(&mut self, frame: usize) {
        self.frame = frame;
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RenderSink for JsonLinesSink<W> {
    fn render(&mut self, instructions: &[RenderInstruction]) -> Result<()> {
        for instruction in instructions {
            let popup = match instruction {
                RenderInstruction::Add { node } | RenderInstruction::Update { node } => {
                    Some(PopupContent::for_node(node).to_html())
                }
                RenderInstruction::Remove { .. } => None,
            };
            let line = OutputLine {
                frame: self.frame,
                instruction,
                popup,
            };
            serde_json::to_writer(&mut self.writer, &line)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
