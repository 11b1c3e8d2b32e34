use std::io::{self, BufRead, IsTerminal, Stdin, Stdout, Write};

use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};

use crate::chat::ChatReply;

/// Clears the terminal and homes the cursor.
pub fn clear_screen<W: Write>(out: &mut W) -> io::Result<()> {
    execute!(out, Clear(ClearType::All), MoveTo(0, 0))
}

/// Line-oriented terminal I/O for the chat loop.
pub struct Console<R, W> {
    input: R,
    output: W,
    // Piped input isn't echoed, so the prompt line has to be ended by us.
    end_prompt_line: bool,
}

impl Console<io::StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        let stdin: Stdin = io::stdin();
        let end_prompt_line = !stdin.is_terminal();
        Self {
            input: stdin.lock(),
            output: io::stdout(),
            end_prompt_line,
        }
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    /// A console over arbitrary streams; the prompt line is always
    /// terminated after reading.
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            end_prompt_line: true,
        }
    }

    /// Prints `prompt` and reads one line without its terminator.
    /// `None` at end of input.
    pub fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        if self.end_prompt_line {
            writeln!(self.output)?;
        }
        if read == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    pub fn notice(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{}", message)?;
        self.output.flush()
    }

    pub fn reply(&mut self, reply: &ChatReply, show_citations: bool) -> io::Result<()> {
        writeln!(self.output, "{}", reply.content)?;
        if show_citations && !reply.citations.is_empty() {
            writeln!(self.output, "Sources:")?;
            for (i, citation) in reply.citations.iter().enumerate() {
                writeln!(self.output, "  [{}] {}", i + 1, citation.label())?;
            }
        }
        self.output.flush()
    }

    pub fn into_output(self) -> W {
        self.output
    }
}
