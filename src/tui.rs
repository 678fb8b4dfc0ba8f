//! Terminal user interface.
//!
//! The cursive event loop runs on a background thread for as long as the
//! prompt is shown; dialogs are pushed to it through its callback sink.

use std::{fmt::Debug, sync::mpsc::Receiver, thread::JoinHandle};

use cursive::{
    views::{Dialog, TextView},
    CbSink, Cursive, CursiveExt,
};

use crate::{
    error::{ProvisionError, ProvisionErrorKind},
    prompt::LaunchPrompt,
};

mod dialog;

pub(crate) struct Tui {
    channel: Option<CbSink>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl Tui {
    pub fn new() -> Self {
        Self {
            channel: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.channel.is_some()
    }

    pub fn run_background(&mut self) -> Result<(), ProvisionError> {
        if self.is_running() {
            return Ok(());
        }

        let (sender, receiver) = std::sync::mpsc::sync_channel(1);

        let join_handle = std::thread::spawn(move || {
            let mut cursive = cursive::Cursive::new();

            if sender.send(cursive.cb_sink().clone()).is_err() {
                return Ok(());
            }

            cursive.run_crossterm()
        });

        self.handle = Some(join_handle);

        match receiver.recv() {
            Ok(channel) => {
                self.channel = Some(channel);
                Ok(())
            }
            Err(_error) => {
                self.join()?;
                Err(ProvisionErrorKind::Terminal.into())
            }
        }
    }

    pub fn stop(&mut self) -> Result<(), ProvisionError> {
        if let Some(channel) = self.channel.take() {
            let _ = channel.send(Box::new(|cursive| cursive.quit()));
        }

        self.join()
    }

    fn join(&mut self) -> Result<(), ProvisionError> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_panic| ProvisionError::new(ProvisionErrorKind::Terminal))??;
        }

        Ok(())
    }

    pub fn confirm(&self, title: &str, question: &str) -> Result<bool, ProvisionError> {
        let (mut dialog, dialog_receiver) = dialog::confirm_dialog(title);
        dialog.set_content(TextView::new(question));

        self.show_wait_dialog(dialog, dialog_receiver)
    }

    fn show_wait_dialog<T>(
        &self,
        dialog: Dialog,
        dialog_receiver: Receiver<T>,
    ) -> Result<T, ProvisionError>
    where
        T: Send + 'static,
    {
        self.in_cursive(move |cursive| {
            cursive.add_layer(dialog);
        })?;

        dialog_receiver
            .recv()
            .map_err(|_error| ProvisionErrorKind::Terminal.into())
    }

    fn in_cursive<F, T>(&self, func: F) -> Result<T, ProvisionError>
    where
        F: FnOnce(&mut Cursive) -> T + Send + 'static,
        T: Send + 'static,
    {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| ProvisionError::new(ProvisionErrorKind::Terminal))?;
        let (sender, receiver) = std::sync::mpsc::sync_channel(1);

        let result = channel.send(Box::new(move |cursive| {
            let _ = sender.send(func(cursive));
        }));

        if result.is_err() {
            Err(ProvisionErrorKind::Terminal.into())
        } else {
            receiver
                .recv()
                .map_err(|_e| ProvisionErrorKind::Terminal.into())
        }
    }
}

impl Debug for Tui {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tui")
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        if let Some(channel) = &mut self.channel {
            let _ = channel.send(Box::new(|cursive| cursive.quit()));
        }
    }
}

/// Launch prompt drawn as a Yes/No dialog in the terminal.
#[derive(Debug)]
pub struct TuiPrompt {
    tui: Tui,
}

impl TuiPrompt {
    /// Creates the prompt. The terminal is only taken over while asking.
    pub fn new() -> Self {
        Self { tui: Tui::new() }
    }
}

impl Default for TuiPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchPrompt for TuiPrompt {
    fn confirm_launch(&mut self, app_name: &str) -> Result<bool, ProvisionError> {
        self.tui.run_background()?;

        let answer = self
            .tui
            .confirm(&format!("{app_name} Setup"), &format!("Launch {app_name} now?"));

        self.tui.stop()?;

        answer
    }
}
