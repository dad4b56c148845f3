use crate::source::InputEvent;

#[derive(Debug, PartialEq)]
pub enum AcpiEvent {
    /// A full binary record from an input device.
    Input(InputEvent),
    /// One line from the textual event file, newline removed.  Raw bytes.
    Line(Vec<u8>),
    /// The source at this index hit end of file or a read error.
    SourceClosed(usize),
    /// A termination signal arrived; tear down and exit.
    Shutdown,
}
