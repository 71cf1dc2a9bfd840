use quest_core::reveal::{RecordedData, StepMode};
use services::{QuestSession, StepOutcome};

pub fn outcome(outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Moved { from, to } => println!("Moved from step {} to step {}.", from + 1, to + 1),
        StepOutcome::Recorded => println!("Saved."),
        StepOutcome::Unchanged => println!("Nothing to change."),
        StepOutcome::Blocked(rejection) => println!("Locked: {rejection}"),
        StepOutcome::Finished { completed_at } => {
            println!("Lesson finished at {}.", completed_at.to_rfc3339());
        }
    }
}

fn recorded(data: &RecordedData<'_>) -> String {
    match data {
        RecordedData::None => String::new(),
        RecordedData::Role(role) => format!("role: {}", role.unwrap_or("-")),
        RecordedData::Video { watched_percent } => {
            format!("watched: {}%", watched_percent.unwrap_or(0))
        }
        RecordedData::Table(table) => format!(
            "rows: {}{}",
            table.rows.len(),
            if table.completed { ", saved" } else { "" }
        ),
        RecordedData::Form(form) => {
            let mut line = format!(
                "answers: {}{}",
                form.answers.len(),
                if form.completed { ", submitted" } else { "" }
            );
            if let Some(summary) = &form.summary {
                line.push_str(&format!(", summary: {summary}"));
            }
            line
        }
    }
}

pub fn status(session: &QuestSession) {
    let progress = session.progress();
    println!(
        "Lesson {} | step {}/{} | {} completed{}",
        session.lesson(),
        progress.current_step_index + 1,
        progress.total_steps,
        progress.completed_steps,
        if progress.is_finished { " | finished" } else { "" }
    );

    for view in session.visible_steps() {
        let marker = match (view.mode, view.completed) {
            (StepMode::Interactive, _) => ">",
            (StepMode::ReadOnly, true) => "x",
            (StepMode::ReadOnly, false) => " ",
        };
        println!(
            "  [{marker}] {:>2} {:<22} {:<36} {}",
            view.index + 1,
            view.block.kind().tag(),
            view.block.id().to_string(),
            recorded(&view.recorded)
        );
    }

    let ahead: Vec<String> = session
        .indicators()
        .into_iter()
        .filter(|i| i.index > progress.current_step_index)
        .map(|i| {
            if i.reachable {
                format!("{}", i.index + 1)
            } else {
                format!("{}*", i.index + 1)
            }
        })
        .collect();
    if !ahead.is_empty() {
        println!("  ahead: {} (* locked)", ahead.join(" "));
    }

    if !progress.is_finished {
        if let Some(rejection) = session.current_rejection() {
            println!("Locked: {rejection}");
        }
    }
}
