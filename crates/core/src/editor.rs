use crate::chat::ChatEvents;
use crate::client::ChatEvent;

/// The two document mutations the AI layer needs from the editor, plus the
/// current selection. Positions count characters.
pub trait EditorCommands {
    fn selected_text(&self) -> String;
    fn insert_text(&mut self, text: &str, position: usize);
    fn replace_range(&mut self, from: usize, to: usize, text: &str);
}

/// Where streamed text lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    InsertAt(usize),
    /// The first delta replaces `from..to`; later ones follow it.
    ReplaceRange { from: usize, to: usize },
}

/// Write every streamed delta into `editor` as it arrives and return the
/// number of characters written. Returns when the exchange stops.
pub async fn apply_stream<E>(events: &mut ChatEvents, editor: &mut E, placement: Placement) -> usize
where
    E: EditorCommands + ?Sized,
{
    let (mut cursor, mut pending_range) = match placement {
        Placement::InsertAt(pos) => (pos, None),
        Placement::ReplaceRange { from, to } => (from, Some((from, to))),
    };
    let mut written = 0usize;
    while let Some(ev) = events.recv().await {
        let message = match ev {
            ChatEvent::Message(m) => m,
            ChatEvent::Stopped => break,
            ChatEvent::Started(_) => continue,
        };
        if message.content.is_empty() {
            continue;
        }
        match pending_range.take() {
            Some((from, to)) => editor.replace_range(from, to, &message.content),
            None => editor.insert_text(&message.content, cursor),
        }
        let n = message.content.chars().count();
        cursor += n;
        written += n;
    }
    written
}
