// src/ui/widgets/mod.rs

// Module declarations for every UI widget.
pub mod analysis_view; // Findings list plus the knowledge base detail pane.
pub mod disclaimer_popup; // Legal disclaimer shown on startup.
pub mod footer; // Key bindings for the current state.
pub mod input; // Target field and scan type.
pub mod summary; // Score, per-probe checklist and issue counts.
