use std::sync::mpsc::Receiver;

use cursive::{
    align::HAlign,
    views::{Dialog, DialogFocus},
};

/// Returns a dialog with No and Yes buttons, focused on Yes.
///
/// The receiver gets `true` for Yes. Escape is not bound; the operator has to
/// pick a button.
pub fn confirm_dialog(title: &str) -> (Dialog, Receiver<bool>) {
    let (sender, receiver) = std::sync::mpsc::sync_channel(1);
    let sender2 = sender.clone();

    let mut dialog = Dialog::new().title(title).h_align(HAlign::Right);

    dialog.add_button("No", move |cursive| {
        cursive.pop_layer();
        let _ = sender.send(false);
    });
    dialog.add_button("Yes", move |cursive| {
        cursive.pop_layer();
        let _ = sender2.send(true);
    });

    let _ = dialog.set_focus(DialogFocus::Button(1));

    (dialog, receiver)
}
