//! Derived display data for the task list.

use super::TaskWorkspace;
use crate::models::Task;

pub const EMPTY_MESSAGE: &str = "Aún no has creado tareas.";
pub const COMPLETED_MARKER: &str = "Completada";
pub const DELETE_LABEL: &str = "Eliminar";

/// Label of the button that flips `task`'s completion flag.
pub fn toggle_label(task: &Task) -> &'static str {
    if task.completada {
        "Marcar pendiente"
    } else {
        "Marcar completa"
    }
}

impl TaskWorkspace {
    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    pub fn completed(&self) -> usize {
        self.tasks.iter().filter(|t| t.completada).count()
    }

    /// `Tienes <n> tarea(s).`, plus the completed count when there is at
    /// least one task.
    pub fn summary(&self) -> String {
        let total = self.total();
        let mut line = format!("Tienes {total} tarea(s).");
        if total > 0 {
            line.push_str(&format!(" Completadas: {}.", self.completed()));
        }
        line
    }
}
