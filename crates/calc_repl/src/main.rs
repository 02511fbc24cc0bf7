use anyhow::Result;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use calc_core::grammar::KEYWORDS;
use calc_core::{parse, Session, Value};

const EXIT: (&str, &str) = ("exit", "Exit the calculator");

struct CalcHelper;

impl Completer for CalcHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(|c: char| !c.is_ascii_alphanumeric())
            .map_or(0, |i| i + 1);
        let word = &line[start..pos];
        let candidates = KEYWORDS
            .iter()
            .chain(std::iter::once(&EXIT))
            .filter(|(keyword, _)| keyword.starts_with(word))
            .map(|(keyword, description)| Pair {
                display: format!("{keyword} - {description}"),
                replacement: (*keyword).to_string(),
            })
            .collect();
        Ok((start, candidates))
    }
}

impl Hinter for CalcHelper {
    type Hint = String;
}

impl Highlighter for CalcHelper {}

impl Validator for CalcHelper {}

impl Helper for CalcHelper {}

fn main() -> Result<()> {
    let mut editor: Editor<CalcHelper, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(CalcHelper));
    let mut session = Session::new();
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input == "exit" {
                    break;
                }
                let _ = editor.add_history_entry(input);
                respond(&mut session, input);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn respond(session: &mut Session, input: &str) {
    let parsed = match parse(input) {
        Ok(parsed) => parsed,
        Err(err) => {
            println!("{err}");
            return;
        }
    };
    match session.eval(&parsed) {
        Ok(Value::Matrix(matrix)) => {
            // Show the exact form alongside a decimal expansion scaled to
            // the session precision.
            let digits = session.precision() as usize / 4;
            match matrix.float_string(digits, session.precision()) {
                Some(decimal) => println!("{matrix} = {decimal}"),
                None => println!("{matrix}"),
            }
        }
        Ok(value) => println!("{value}"),
        Err(err) => println!("{err}"),
    }
}
