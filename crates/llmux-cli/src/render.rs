use console::style;
use llmux::models::stream::{StopReason, StreamChunk, Usage};
use std::io::{self, Write};

/// Prints canonical chunks as they arrive
pub struct ChunkPrinter<W: Write> {
    out: W,
    current_tool: Option<String>,
    usage: Option<Usage>,
}

impl<W: Write> ChunkPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            current_tool: None,
            usage: None,
        }
    }

    pub fn print(&mut self, chunk: &StreamChunk) -> io::Result<()> {
        match chunk {
            StreamChunk::Text { text } => {
                self.end_tool()?;
                write!(self.out, "{}", text)?;
            }
            StreamChunk::Reasoning { text } => write!(self.out, "{}", style(text).dim())?,
            StreamChunk::ToolUseDelta {
                id,
                name,
                partial_input,
            } => {
                if self.current_tool.as_deref() != Some(id.as_str()) {
                    self.end_tool()?;
                    write!(self.out, "\n{} ", style(format!("⚙ {}", name)).cyan().bold())?;
                    self.current_tool = Some(id.clone());
                }
                write!(self.out, "{}", style(partial_input).dim())?;
            }
            StreamChunk::Usage(usage) => self.usage = Some(usage.clone()),
            StreamChunk::Done { stop_reason } => {
                self.end_tool()?;
                writeln!(self.out)?;
                if !matches!(stop_reason, StopReason::EndTurn | StopReason::ToolUse) {
                    writeln!(
                        self.out,
                        "{}",
                        style(format!("[stopped: {}]", stop_reason)).yellow()
                    )?;
                }
                if let Some(usage) = self.usage.take() {
                    writeln!(self.out, "{}", style(summary(&usage)).dim())?;
                }
            }
        }
        self.out.flush()
    }

    fn end_tool(&mut self) -> io::Result<()> {
        if self.current_tool.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }
}

fn summary(usage: &Usage) -> String {
    let mut summary = format!(
        "{} input tokens, {} output tokens",
        usage.input_tokens, usage.output_tokens
    );
    if let Some(cost) = usage.total_cost {
        summary.push_str(&format!(", ${:.4}", cost));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(chunks: &[StreamChunk]) -> String {
        let mut printer = ChunkPrinter::new(Vec::new());
        for chunk in chunks {
            printer.print(chunk).unwrap();
        }
        console::strip_ansi_codes(&String::from_utf8(printer.out).unwrap()).to_string()
    }

    #[test]
    fn test_text_and_usage() {
        let output = render(&[
            StreamChunk::text("Hello"),
            StreamChunk::text(" world"),
            StreamChunk::Usage(Usage {
                total_cost: Some(0.0123),
                ..Usage::new(10, 2)
            }),
            StreamChunk::Done {
                stop_reason: StopReason::EndTurn,
            },
        ]);
        assert_eq!(
            output,
            "Hello world\n10 input tokens, 2 output tokens, $0.0123\n"
        );
    }

    #[test]
    fn test_tool_calls_and_truncation() {
        let output = render(&[
            StreamChunk::ToolUseDelta {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                partial_input: "{\"city\":".to_string(),
            },
            StreamChunk::ToolUseDelta {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                partial_input: "\"Oslo\"}".to_string(),
            },
            StreamChunk::Done {
                stop_reason: StopReason::MaxTokens,
            },
        ]);
        assert_eq!(
            output,
            "\n⚙ get_weather {\"city\":\"Oslo\"}\n\n[stopped: max_tokens]\n"
        );
    }
}
