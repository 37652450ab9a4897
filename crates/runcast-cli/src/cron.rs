use std::process::ExitCode;

use runcast_schedule::{cron, CalendarSchedule, CronExpression};

use crate::cli::{CalendarArgs, CronCommand};

pub fn run(command: CronCommand) -> anyhow::Result<ExitCode> {
    match command {
        CronCommand::Validate { expression } => {
            let errors = cron::validate(&expression);
            if errors.is_empty() {
                println!("valid");
                return Ok(ExitCode::SUCCESS);
            }
            for error in &errors {
                println!("{error}");
            }
            Ok(ExitCode::FAILURE)
        }
        CronCommand::Describe { expression } => match expression.parse::<CronExpression>() {
            Ok(expr) => {
                println!("{}", expr.describe());
                Ok(ExitCode::SUCCESS)
            }
            Err(errors) => {
                for error in &errors {
                    eprintln!("{error}");
                }
                Ok(ExitCode::FAILURE)
            }
        },
        CronCommand::FromCalendar(args) => {
            let schedule = calendar(&args);
            let errors = schedule.validate();
            if !errors.is_empty() {
                anyhow::bail!(errors.join("; "));
            }
            let expr = CronExpression::from(schedule);
            println!("{expr}");
            println!("# {}", expr.describe());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn calendar(args: &CalendarArgs) -> CalendarSchedule {
    CalendarSchedule {
        minute: args.minute,
        hour: args.hour,
        day: args.day,
        weekday: args.weekday,
        month: args.month,
    }
}
