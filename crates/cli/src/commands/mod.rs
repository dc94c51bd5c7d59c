// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands.

use crate::client::{check_response, Client};
use crate::exit_error::ExitError;
use crate::output;
use agd_core::{ExecutionMode, FindingState, RepoId, RunId, TaskId};
use agd_wire::{Request, Response};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Daemon lifecycle.
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// Task queries and triggers.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Run queries and control.
    Run {
        #[command(subcommand)]
        action: RunAction,
    },
    /// Finding triage.
    Finding {
        #[command(subcommand)]
        action: FindingAction,
    },
    /// Worker health.
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },
    /// Workflow execution.
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
    /// Pending harness questions.
    Question {
        #[command(subcommand)]
        action: QuestionAction,
    },
}

#[derive(Subcommand)]
pub enum QuestionAction {
    /// List pending questions.
    List,
    /// Answer a pending question: `--answer q1=main --answer q2=yes`.
    Answer {
        question_id: String,
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,
    },
}

fn parse_answer(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected question=value, got {value:?}"))
}

#[derive(Subcommand)]
pub enum WorkflowAction {
    /// Start a workflow execution.
    Run { workflow_id: String },
    /// Resolve a parked approval node.
    Approve {
        execution_id: String,
        #[arg(long)]
        reject: bool,
    },
}

#[derive(Subcommand)]
pub enum DaemonAction {
    /// Show daemon status.
    Status,
    /// Ask the daemon to shut down.
    Stop,
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// List tasks, optionally for one repository.
    List {
        #[arg(long)]
        repo: Option<String>,
    },
    /// Trigger a task now.
    Trigger {
        task_id: String,
        /// Execution mode override: default, plan, or review.
        #[arg(long)]
        mode: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum RunAction {
    /// List recent runs.
    List {
        #[arg(long)]
        task: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one run.
    Show { run_id: String },
    /// Cancel a run.
    Cancel { run_id: String },
    /// Approve or reject a pending run.
    Approve {
        run_id: String,
        #[arg(long)]
        reject: bool,
    },
    /// Print a run's structured events.
    Events {
        run_id: String,
        #[arg(long, default_value_t = 0)]
        since: u64,
    },
}

#[derive(Subcommand)]
pub enum FindingAction {
    /// List findings, optionally for one repository.
    List {
        #[arg(long)]
        repo: Option<String>,
    },
    /// Move a finding to a new state.
    Resolve {
        finding_id: String,
        /// Target state: acknowledged, in_progress, resolved, ignored.
        #[arg(long, default_value = "resolved")]
        state: String,
    },
}

#[derive(Subcommand)]
pub enum WorkerAction {
    /// List registered workers.
    List,
}

pub async fn run(command: Command) -> Result<(), ExitError> {
    let socket = Client::socket_path();
    let mut client = Client::connect(&socket).await?;
    match command {
        Command::Daemon { action } => daemon(&mut client, action).await,
        Command::Task { action } => task(&mut client, action).await,
        Command::Run { action } => run_cmd(&mut client, action).await,
        Command::Finding { action } => finding(&mut client, action).await,
        Command::Worker { action } => worker(&mut client, action).await,
        Command::Workflow { action } => workflow(&mut client, action).await,
        Command::Question { action } => question(&mut client, action).await,
    }
}

async fn question(client: &mut Client, action: QuestionAction) -> Result<(), ExitError> {
    match action {
        QuestionAction::List => {
            let response = check_response(client.request(Request::ListQuestions).await?)?;
            if let Response::Questions { questions } = response {
                let rows: Vec<Vec<String>> = questions
                    .iter()
                    .map(|q| {
                        vec![
                            q.id.clone(),
                            q.run_id.to_string(),
                            q.header.clone(),
                            q.question_count.to_string(),
                        ]
                    })
                    .collect();
                print!("{}", output::table(&["id", "run", "header", "questions"], &rows));
            }
            Ok(())
        }
        QuestionAction::Answer { question_id, answers } => {
            if answers.is_empty() {
                return Err(ExitError::Usage("at least one --answer is required".to_string()));
            }
            let request = Request::AnswerQuestion { question_id, answers };
            check_response(client.request(request).await?)?;
            println!("answered");
            Ok(())
        }
    }
}

async fn workflow(client: &mut Client, action: WorkflowAction) -> Result<(), ExitError> {
    match action {
        WorkflowAction::Run { workflow_id } => {
            let request = Request::RunWorkflow { workflow_id };
            if let Response::ExecutionStarted { workflow_id } =
                check_response(client.request(request).await?)?
            {
                println!("workflow {workflow_id} started");
            }
            Ok(())
        }
        WorkflowAction::Approve { execution_id, reject } => {
            let request =
                Request::ResolveWorkflowApproval { execution_id, approve: !reject };
            check_response(client.request(request).await?)?;
            println!("{}", if reject { "rejected" } else { "approved" });
            Ok(())
        }
    }
}

async fn daemon(client: &mut Client, action: DaemonAction) -> Result<(), ExitError> {
    match action {
        DaemonAction::Status => {
            let response = check_response(client.request(Request::DaemonStatus).await?)?;
            if let Response::Status { version, uptime_secs, queued_runs, active_runs, workers } =
                response
            {
                println!("agdd {version}");
                println!("uptime: {uptime_secs}s");
                println!("runs: {active_runs} active, {queued_runs} queued");
                println!("workers: {workers}");
            }
            Ok(())
        }
        DaemonAction::Stop => {
            check_response(client.request(Request::Shutdown).await?)?;
            println!("shutdown requested");
            Ok(())
        }
    }
}

async fn task(client: &mut Client, action: TaskAction) -> Result<(), ExitError> {
    match action {
        TaskAction::List { repo } => {
            let repo_id = repo.map(|r| RepoId::from_string(&r));
            let response =
                check_response(client.request(Request::ListTasks { repo_id }).await?)?;
            if let Response::Tasks { tasks } = response {
                let rows: Vec<Vec<String>> = tasks
                    .iter()
                    .map(|t| {
                        vec![
                            t.id.to_string(),
                            t.kind.to_string(),
                            t.harness.clone(),
                            t.mode.to_string(),
                            if t.enabled { "yes" } else { "no" }.to_string(),
                            t.cron_expr.clone().unwrap_or_else(|| "-".to_string()),
                        ]
                    })
                    .collect();
                print!("{}", output::table(&["id", "kind", "harness", "mode", "enabled", "cron"], &rows));
            }
            Ok(())
        }
        TaskAction::Trigger { task_id, mode } => {
            let mode = match mode {
                Some(value) => Some(ExecutionMode::parse_alias(&value).ok_or_else(|| {
                    ExitError::Usage(format!("unknown mode {value:?} (default|plan|review)"))
                })?),
                None => None,
            };
            let request =
                Request::TriggerTask { task_id: TaskId::from_string(&task_id), mode };
            match check_response(client.request(request).await?)? {
                Response::RunStarted { run_id } => println!("{run_id}"),
                Response::RunDeferred { reason } => println!("deferred: {reason}"),
                _ => {}
            }
            Ok(())
        }
    }
}

async fn run_cmd(client: &mut Client, action: RunAction) -> Result<(), ExitError> {
    match action {
        RunAction::List { task, limit } => {
            let task_id = task.map(|t| TaskId::from_string(&t));
            let response =
                check_response(client.request(Request::ListRuns { task_id, limit }).await?)?;
            if let Response::Runs { runs } = response {
                let rows: Vec<Vec<String>> = runs
                    .iter()
                    .map(|r| {
                        vec![
                            r.id.to_string(),
                            r.task_id.to_string(),
                            r.state.to_string(),
                            r.attempt.to_string(),
                            r.summary.clone().unwrap_or_else(|| "-".to_string()),
                        ]
                    })
                    .collect();
                print!("{}", output::table(&["id", "task", "state", "attempt", "summary"], &rows));
            }
            Ok(())
        }
        RunAction::Show { run_id } => {
            let request = Request::GetRun { run_id: RunId::from_string(&run_id) };
            if let Response::Run { run } = check_response(client.request(request).await?)? {
                println!("run:      {}", run.summary.id);
                println!("task:     {}", run.summary.task_id);
                println!("state:    {}", run.summary.state);
                println!("attempt:  {}", run.summary.attempt);
                println!("mode:     {}", run.summary.mode);
                if let Some(worker) = &run.worker_id {
                    println!("worker:   {worker}");
                }
                if let Some(summary) = &run.summary.summary {
                    println!("summary:  {summary}");
                }
                if let Some(error) = &run.error {
                    println!("error:    {error}");
                }
                if let Some(reason) = &run.reason {
                    println!("reason:   {reason}");
                }
                println!("artifacts: {}", run.artifact_count);
            }
            Ok(())
        }
        RunAction::Cancel { run_id } => {
            let request = Request::CancelRun { run_id: RunId::from_string(&run_id) };
            check_response(client.request(request).await?)?;
            println!("cancelled");
            Ok(())
        }
        RunAction::Approve { run_id, reject } => {
            let request =
                Request::ApproveRun { run_id: RunId::from_string(&run_id), approve: !reject };
            check_response(client.request(request).await?)?;
            println!("{}", if reject { "rejected" } else { "approved" });
            Ok(())
        }
        RunAction::Events { run_id, since } => {
            let request = Request::GetRunEvents {
                run_id: RunId::from_string(&run_id),
                since_sequence: since,
            };
            if let Response::Events { events } = check_response(client.request(request).await?)? {
                for event in events {
                    println!(
                        "{:>6}  {:<20}  {}",
                        event.sequence,
                        event.category.to_string(),
                        serde_json::to_string(&event.payload).unwrap_or_default()
                    );
                }
            }
            Ok(())
        }
    }
}

async fn finding(client: &mut Client, action: FindingAction) -> Result<(), ExitError> {
    match action {
        FindingAction::List { repo } => {
            let repo_id = repo.map(|r| RepoId::from_string(&r));
            let response =
                check_response(client.request(Request::ListFindings { repo_id }).await?)?;
            if let Response::Findings { findings } = response {
                let rows: Vec<Vec<String>> = findings
                    .iter()
                    .map(|f| {
                        vec![
                            f.id.clone(),
                            f.state.to_string(),
                            f.severity.to_string(),
                            f.title.clone(),
                        ]
                    })
                    .collect();
                print!("{}", output::table(&["id", "state", "severity", "title"], &rows));
            }
            Ok(())
        }
        FindingAction::Resolve { finding_id, state } => {
            let state = parse_finding_state(&state)?;
            let request = Request::ResolveFinding { finding_id, state };
            check_response(client.request(request).await?)?;
            println!("updated");
            Ok(())
        }
    }
}

async fn worker(client: &mut Client, action: WorkerAction) -> Result<(), ExitError> {
    match action {
        WorkerAction::List => {
            let response = check_response(client.request(Request::ListWorkers).await?)?;
            if let Response::Workers { workers } = response {
                let rows: Vec<Vec<String>> = workers
                    .iter()
                    .map(|w| {
                        vec![
                            w.id.to_string(),
                            w.endpoint.clone(),
                            format!("{}/{}", w.active_slots, w.max_slots),
                            if w.healthy { "healthy" } else { "silent" }.to_string(),
                        ]
                    })
                    .collect();
                print!("{}", output::table(&["id", "endpoint", "slots", "health"], &rows));
            }
            Ok(())
        }
    }
}

fn parse_finding_state(value: &str) -> Result<FindingState, ExitError> {
    match value {
        "new" => Ok(FindingState::New),
        "acknowledged" => Ok(FindingState::Acknowledged),
        "in_progress" => Ok(FindingState::InProgress),
        "resolved" => Ok(FindingState::Resolved),
        "ignored" => Ok(FindingState::Ignored),
        other => Err(ExitError::Usage(format!("unknown finding state {other:?}"))),
    }
}
