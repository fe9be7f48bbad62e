//! Plain-text rendering for the terminal front end.

use std::fmt::Write as _;

use quiz_core::model::{Level, QuizResult, QuizSession};
use quiz_core::time::format_elapsed;
use services::{LevelStanding, ResultListItem};

/// One line of player input during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Select(usize),
    Next,
    Previous,
    Quit,
    Invalid,
}

/// Options are shown 1-based; `Select` carries the 0-based index.
pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim().to_ascii_lowercase();
    match trimmed.as_str() {
        "n" | "next" | "s" | "submit" => Input::Next,
        "p" | "prev" | "previous" => Input::Previous,
        "q" | "quit" => Input::Quit,
        other => match other.parse::<usize>() {
            Ok(n) if n >= 1 => Input::Select(n - 1),
            _ => Input::Invalid,
        },
    }
}

pub fn question(session: &QuizSession) -> String {
    let progress = session.progress();
    let current = session.current_question();
    let selected = session.selected_answer();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Question {}/{} ({}% through, {} answered)",
        progress.position, progress.total, progress.percent_through, progress.answered
    );
    let _ = writeln!(out, "{}", current.text());
    for (idx, option) in current.options().iter().enumerate() {
        let mark = if selected == Some(idx) { 'x' } else { ' ' };
        let _ = writeln!(out, "  [{mark}] {}. {option}", idx + 1);
    }

    let forward = if session.is_last() { "(s)ubmit" } else { "(n)ext" };
    let back = if session.can_retreat() { ", (p)revious" } else { "" };
    let _ = write!(
        out,
        "Choose 1-{}, {forward}{back}, (q)uit",
        current.option_count()
    );
    out
}

pub fn result(result: &QuizResult, level: Option<Level>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Score: {}/{} ({}%)  Time: {}",
        result.correct_answers(),
        result.total_questions(),
        result.percentage(),
        format_elapsed(result.elapsed_secs())
    );
    if let Some(level) = level {
        let _ = writeln!(out, "Level achieved: {level}");
    }

    for (idx, outcome) in result.questions().iter().enumerate() {
        let verdict = if outcome.is_correct { "correct" } else { "wrong" };
        let _ = writeln!(out);
        let _ = writeln!(out, "{}. {} [{verdict}]", idx + 1, outcome.question);
        let _ = writeln!(
            out,
            "   Your answer: {}",
            outcome.given_text.as_deref().unwrap_or("Not answered")
        );
        let _ = writeln!(out, "   Correct answer: {}", outcome.correct_text);
        if !outcome.explanation.is_empty() {
            let _ = writeln!(out, "   {}", outcome.explanation);
        }
    }
    out
}

pub fn standing(standing: &LevelStanding) -> String {
    const WIDTH: usize = 20;
    let filled = usize::from(standing.progress_percent) * WIDTH / 100;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(WIDTH - filled));
    let mut out = format!(
        "Level: {}  [{bar}] {}%",
        standing.label, standing.progress_percent
    );
    if standing.level.is_none() {
        out.push_str("  (not a known level)");
    }
    out
}

pub fn history_line(item: &ResultListItem) -> String {
    let mut line = format!(
        "#{:<4} {:<11} {:>5} {:>4}%  {:>5}  {}",
        item.id,
        item.quiz_kind.as_str(),
        item.score_label(),
        item.percentage,
        item.elapsed_label(),
        item.completed_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(level) = item.level_achieved {
        let _ = write!(line, "  {level}");
    }
    line
}
