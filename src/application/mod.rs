// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer wires the other layers together for one goal
// (training, sampling or reporting on an entry).
//
// Rules for this layer:
//   - No model math here (that's Layer 5)
//   - No printing here (that's Layer 1)
//   - Cache layout is only reached through Layer 6 handles
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Train an entry up to an epoch target
pub mod train_use_case;

// Generate or fetch cached samples
pub mod sample_use_case;

// Read-only entry reports
pub mod report_use_case;
