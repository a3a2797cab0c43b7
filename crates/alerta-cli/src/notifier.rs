use alerta_core::notify::{SyncNotification, SyncNotifier};

/// Prints sync notifications to the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl SyncNotifier for ConsoleNotifier {
    fn notify(&self, notification: &SyncNotification) {
        if notification.is_error {
            eprintln!("{}: {}", notification.title, notification.body);
        } else {
            println!("{}: {}", notification.title, notification.body);
        }
    }
}
