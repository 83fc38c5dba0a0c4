// objsh REPL
//
// Interactive shell over the interpreter and the class runtime. Lines with
// unbalanced braces or brackets keep accumulating until the script is
// complete, then the whole buffer is evaluated.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use objsh::reader::script_is_complete;
use objsh::new_shell;

fn main() -> rustyline::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    println!("objsh 0.2.0");
    println!("Type exit or Ctrl-D to leave");

    let (mut interp, mut oo) = new_shell();
    let mut editor = DefaultEditor::new()?;
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "% " } else { "> " };
        match editor.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() && line.trim() == "exit" {
                    break;
                }
                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(&line);
                if !script_is_complete(&buffer) {
                    continue;
                }
                let script = std::mem::take(&mut buffer);
                if script.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(script.as_str());
                match interp.eval(&mut oo, &script) {
                    Ok(value) => {
                        if !value.is_empty() {
                            println!("{}", value);
                        }
                    }
                    Err(e) => {
                        eprintln!("error: {}", e.render());
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("error: {}", err);
                break;
            }
        }
    }
    Ok(())
}
