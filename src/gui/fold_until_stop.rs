use std::{io::stdout, ops::ControlFlow, sync::mpsc, thread::spawn, time::Duration};

use crate::gui::error::GloveGuiError;

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};

use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

enum ThreadMessage {
    Stop,
}

/// Runs `f` on a worker thread until the user presses a key or `f` breaks,
/// showing the lines returned by `status` in the meantime.
///
/// The worker is a fold: `init` is the starting state, each call to `f`
/// turns the current state into the next one. A [ControlFlow::Break] ends
/// the fold early. The last state is returned either way.
pub fn fold_until_stop<F, T, S>(
    title: &str,
    init: T,
    f: F,
    status: S,
) -> Result<T, GloveGuiError>
where
    F: Fn(T) -> ControlFlow<T, T> + Send + 'static,
    T: Send + 'static,
    S: Fn() -> Vec<String>,
{
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let (stop_tx, stop_rx) = mpsc::channel();
    let (res_tx, res_rx) = mpsc::channel();

    let th = spawn(move || {
        let mut val = init;

        loop {
            match f(val) {
                ControlFlow::Continue(next) => val = next,
                ControlFlow::Break(last) => {
                    val = last;
                    break;
                }
            }
            if let Ok(ThreadMessage::Stop) = stop_rx.try_recv() {
                break;
            }
        }
        // Only fails if the screen already gave up on us.
        let _ = res_tx.send(val);
    });

    let res = draw_until_stop(&mut terminal, title, &status, &stop_tx, &res_rx);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    let res = res?;
    th.join().map_err(|_| GloveGuiError::JoinError)?;
    Ok(res)
}

fn draw_until_stop<B, T, S>(
    terminal: &mut Terminal<B>,
    title: &str,
    status: &S,
    stop_tx: &mpsc::Sender<ThreadMessage>,
    res_rx: &mpsc::Receiver<T>,
) -> Result<T, GloveGuiError>
where
    B: Backend,
    S: Fn() -> Vec<String>,
{
    loop {
        if let Ok(res) = res_rx.try_recv() {
            return Ok(res);
        }

        let title = Title::from(Span::from(format!(" {} ", title)).magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Stop ".into(),
            "<Any Key> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let lines: Vec<Line> = status().into_iter().map(Line::from).collect();
        let text = Paragraph::new(lines).block(block);

        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(text, area);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return stop_worker(stop_tx, res_rx);
                }
            }
        }
    }
}

// The worker may have finished on its own already and dropped its end of
// the stop channel; its result is still waiting in `res_rx`.
fn stop_worker<T>(
    stop_tx: &mpsc::Sender<ThreadMessage>,
    res_rx: &mpsc::Receiver<T>,
) -> Result<T, GloveGuiError> {
    let _ = stop_tx.send(ThreadMessage::Stop);
    Ok(res_rx.recv()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_keeps_result_of_finished_worker() {
        let (stop_tx, stop_rx) = mpsc::channel();
        let (res_tx, res_rx) = mpsc::channel();

        res_tx.send(42u64).unwrap();
        drop(stop_rx);
        drop(res_tx);

        assert_eq!(stop_worker(&stop_tx, &res_rx).unwrap(), 42);
    }

    #[test]
    fn stop_reaches_running_worker() {
        let (stop_tx, stop_rx) = mpsc::channel();
        let (res_tx, res_rx) = mpsc::channel();

        let th = spawn(move || {
            let mut n = 0u64;
            while stop_rx.try_recv().is_err() {
                n += 1;
                std::thread::yield_now();
            }
            res_tx.send(n).unwrap();
        });

        assert!(stop_worker(&stop_tx, &res_rx).is_ok());
        th.join().unwrap();
    }

    #[test]
    fn stop_reports_worker_that_vanished() {
        let (stop_tx, _stop_rx) = mpsc::channel();
        let (res_tx, res_rx) = mpsc::channel::<u64>();
        drop(res_tx);

        assert!(matches!(
            stop_worker(&stop_tx, &res_rx),
            Err(GloveGuiError::MPSCRecvError(_))
        ));
    }
}
