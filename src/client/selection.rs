//! Per-axis selections shared by the store clients.
//!
//! The HTTP client uses [`selected_shape`] to know how many samples to expect
//! and [`slice_expression`] to build the `slice=` query parameter; the
//! in-memory store applies the selection directly with [`apply_selection`].

use ndarray::{ArrayD, Axis, Slice};

use super::node_client::AxisSelection;
use crate::error::ClientError;

/// Shape of the result of applying `selection` to an array of `shape`.
///
/// Checks that there is one selection per axis, that indexes are in range
/// and that strides are positive.
pub fn selected_shape(
    shape: &[usize],
    selection: &[AxisSelection],
) -> Result<Vec<usize>, ClientError> {
    if shape.len() != selection.len() {
        return Err(ClientError::InvalidSelection(format!(
            "{} selections for an array with {} dimensions",
            selection.len(),
            shape.len()
        )));
    }

    let mut out = Vec::with_capacity(shape.len());
    for (axis, (&len, sel)) in shape.iter().zip(selection).enumerate() {
        match *sel {
            AxisSelection::Index(index) => {
                if index >= len {
                    return Err(ClientError::IndexOutOfRange { axis, index, len });
                }
            }
            AxisSelection::Strided(0) => {
                return Err(ClientError::InvalidSelection(format!(
                    "zero stride on axis {}",
                    axis
                )));
            }
            AxisSelection::Strided(step) => out.push(len.div_ceil(step)),
        }
    }
    Ok(out)
}

/// Apply `selection` to an in-memory array.
pub fn apply_selection(
    array: &ArrayD<f64>,
    selection: &[AxisSelection],
) -> Result<ArrayD<f64>, ClientError> {
    selected_shape(array.shape(), selection)?;

    let mut view = array.view();
    for (axis, sel) in selection.iter().enumerate() {
        if let AxisSelection::Strided(step) = *sel {
            if step > 1 {
                view.slice_axis_inplace(Axis(axis), Slice::new(0, None, step as isize));
            }
        }
    }
    // Drop indexed axes last-to-first so the remaining axis numbers stay valid.
    for (axis, sel) in selection.iter().enumerate().rev() {
        if let AxisSelection::Index(index) = *sel {
            view = view.index_axis_move(Axis(axis), index);
        }
    }
    Ok(view.to_owned())
}

/// Render `selection` in NumPy slice syntax, e.g. `2,:,::10,::10`.
pub fn slice_expression(selection: &[AxisSelection]) -> String {
    selection
        .iter()
        .map(|sel| match *sel {
            AxisSelection::Index(index) => index.to_string(),
            AxisSelection::Strided(1) => ":".to_string(),
            AxisSelection::Strided(step) => format!("::{}", step),
        })
        .collect::<Vec<_>>()
        .join(",")
}
