//! Rewrite every occurrence of an old identifier in an identification document.

use serde::Serialize;

use crate::document::{Document, Node, SPECTRUM_REFERENCE_ATTRIBUTE};

/// The number of changes made by [`propagate`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Propagation {
    /// Number of text nodes that contained the old identifier
    pub texts: usize,
    /// Number of attribute values that contained the old identifier
    pub attributes: usize,
    /// Number of spectrum reference elements that were pointed to the new spectrum file
    pub spectrum_references: usize,
}

/// Replace all occurrences of `old_identifier` by `new_identifier` in every text node and every
/// attribute value (namespace declarations excluded) of the document. Afterwards the location of
/// every spectrum reference element is set to `spectrum_reference`, regardless of what the
/// replacement did to it.
///
/// An empty `old_identifier` only updates the spectrum references.
pub fn propagate(
    document: &mut Document,
    old_identifier: &str,
    new_identifier: &str,
    spectrum_reference: &str,
) -> Propagation {
    let mut propagation = Propagation::default();
    let replace = |value: &mut String| {
        if !old_identifier.is_empty() && value.contains(old_identifier) {
            *value = value.replace(old_identifier, new_identifier);
            true
        } else {
            false
        }
    };

    document.root.for_each_element_mut(&mut |element| {
        for child in &mut element.children {
            if let Node::Text(text) = child
                && replace(text)
            {
                propagation.texts += 1;
            }
        }
        for attribute in &mut element.attributes {
            if !attribute.is_namespace_declaration() && replace(&mut attribute.value) {
                propagation.attributes += 1;
            }
        }
        if element.is_spectrum_reference() {
            element.set_attribute(SPECTRUM_REFERENCE_ATTRIBUTE, spectrum_reference);
            propagation.spectrum_references += 1;
        }
    });

    propagation
}
