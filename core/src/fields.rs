use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Input kind of a form field. Wire names follow HTML input types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Email,
    #[serde(rename = "tel")]
    Phone,
    Date,
    #[serde(rename = "textarea")]
    Multiline,
}

impl FieldType {
    pub const ALL: [FieldType; 5] = [
        FieldType::Text,
        FieldType::Email,
        FieldType::Phone,
        FieldType::Date,
        FieldType::Multiline,
    ];

    /// Wire name, also used verbatim in agent instructions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Email => "email",
            Self::Phone => "tel",
            Self::Date => "date",
            Self::Multiline => "textarea",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Email => "Email",
            Self::Phone => "Phone",
            Self::Date => "Date",
            Self::Multiline => "Textarea",
        }
    }
}

/// A single field of the form being filled.
///
/// `name` is the key the agent refers to when it stores a value; `id` is the
/// opaque identity used by user edits and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Value collected so far (typed by the user or extracted by the agent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Display and collection sequence. Not necessarily contiguous.
    pub order: i64,
}

/// Partial update merged into a field by [`FormSchema::update_field`].
/// `None` members leave the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChanges {
    pub name: Option<String>,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub required: Option<bool>,
    pub placeholder: Option<String>,
    pub value: Option<String>,
}

impl FieldChanges {
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    fn apply(self, field: &mut FormField) {
        if let Some(name) = self.name {
            field.name = name;
        }
        if let Some(label) = self.label {
            field.label = label;
        }
        if let Some(field_type) = self.field_type {
            field.field_type = field_type;
        }
        if let Some(required) = self.required {
            field.required = required;
        }
        if let Some(placeholder) = self.placeholder {
            field.placeholder = Some(placeholder);
        }
        if let Some(value) = self.value {
            field.value = Some(value);
        }
    }
}

/// The form's fields. Stored in insertion order; [`FormSchema::sorted_fields`]
/// gives the `order` sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FormSchema {
    pub fields: Vec<FormField>,
}

impl FormSchema {
    pub fn new(fields: Vec<FormField>) -> Self {
        Self { fields }
    }

    /// Built-in form used on first launch and by "reset to default".
    pub fn default_form() -> Self {
        let field = |name: &str,
                     field_type: FieldType,
                     label: &str,
                     required: bool,
                     placeholder: Option<&str>,
                     order: i64| FormField {
            id: name.to_string(),
            name: name.to_string(),
            field_type,
            label: label.to_string(),
            required,
            placeholder: placeholder.map(str::to_string),
            value: None,
            order,
        };

        Self::new(vec![
            field(
                "firstName",
                FieldType::Text,
                "First name",
                true,
                Some("Enter your first name"),
                1,
            ),
            field(
                "lastName",
                FieldType::Text,
                "Last name",
                true,
                Some("Enter your last name"),
                2,
            ),
            field("birthday", FieldType::Date, "Birthday date", false, None, 3),
            field("city", FieldType::Text, "City", false, Some("Enter your city"), 4),
            field(
                "zipCode",
                FieldType::Text,
                "Zip code",
                false,
                Some("Enter your zip code"),
                5,
            ),
            field(
                "message",
                FieldType::Multiline,
                "Message",
                false,
                Some("Enter your message"),
                6,
            ),
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Fields ascending by `order`; ties keep insertion order.
    pub fn sorted_fields(&self) -> Vec<&FormField> {
        let mut sorted: Vec<&FormField> = self.fields.iter().collect();
        sorted.sort_by_key(|field| field.order);
        sorted
    }

    pub fn field(&self, id: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.id == id)
    }

    /// First field with this `name` in `order` sequence.
    pub fn field_by_name(&self, name: &str) -> Option<&FormField> {
        self.position_by_name(name).map(|idx| &self.fields[idx])
    }

    fn position_by_name(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.name == name)
            .min_by_key(|(idx, field)| (field.order, *idx))
            .map(|(idx, _)| idx)
    }

    fn next_order(&self) -> i64 {
        self.fields
            .iter()
            .map(|field| field.order)
            .max()
            .unwrap_or(0)
            .max(0)
            + 1
    }

    /// First `field{N}` name, counting up from the field count, that no
    /// field uses yet.
    fn next_generated_name(&self) -> String {
        (self.fields.len() + 1..)
            .map(|n| format!("field{n}"))
            .find(|name| self.fields.iter().all(|field| &field.name != name))
            .unwrap_or_default()
    }

    /// Append a blank text field after the current last one.
    pub fn add_field(&mut self) -> &FormField {
        let field = FormField {
            id: format!("field_{}", Uuid::now_v7().simple()),
            name: self.next_generated_name(),
            field_type: FieldType::Text,
            label: "New Field".to_string(),
            required: false,
            placeholder: Some(String::new()),
            value: None,
            order: self.next_order(),
        };
        self.fields.push(field);
        &self.fields[self.fields.len() - 1]
    }

    /// Returns `false` when no field has this id.
    pub fn update_field(&mut self, id: &str, changes: FieldChanges) -> bool {
        match self.fields.iter_mut().find(|field| field.id == id) {
            Some(field) => {
                changes.apply(field);
                true
            }
            None => false,
        }
    }

    /// Remaining fields keep their `order`, gaps included.
    pub fn delete_field(&mut self, id: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|field| field.id != id);
        self.fields.len() != before
    }

    /// Move `dragged_id` to the position `target_id` occupies in the `order`
    /// sequence, then renumber every field `1..=N`.
    pub fn reorder(&mut self, dragged_id: &str, target_id: &str) -> bool {
        if dragged_id == target_id {
            return false;
        }

        let mut sorted: Vec<FormField> = self.fields.clone();
        sorted.sort_by_key(|field| field.order);

        let Some(dragged_idx) = sorted.iter().position(|f| f.id == dragged_id) else {
            return false;
        };
        let Some(target_idx) = sorted.iter().position(|f| f.id == target_id) else {
            return false;
        };

        let dragged = sorted.remove(dragged_idx);
        let insert_at = target_idx.min(sorted.len());
        sorted.insert(insert_at, dragged);

        for (position, field) in sorted.iter_mut().enumerate() {
            field.order = position as i64 + 1;
        }
        self.fields = sorted;
        true
    }

    /// Store an agent-extracted value. Returns the id of the updated field.
    pub fn set_value_by_name(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        let idx = self.position_by_name(name)?;
        let field = &mut self.fields[idx];
        field.value = Some(value.into());
        Some(field.id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchemaEditError {
    #[error("the form cannot be edited while a call is connected")]
    Locked,
}

/// User-facing editor over a [`FormSchema`].
///
/// Structural and value edits are refused while `locked` (a call is
/// connected). Values extracted by the agent go through
/// [`FormBuilder::apply_tool_value`], which ignores the lock.
#[derive(Debug, Clone, Default)]
pub struct FormBuilder {
    schema: FormSchema,
    locked: bool,
    revision: u64,
}

impl FormBuilder {
    pub fn new(schema: FormSchema) -> Self {
        Self {
            schema,
            locked: false,
            revision: 0,
        }
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Bumped by every accepted edit and lock change. Equal revisions mean
    /// an unchanged schema and lock.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_locked(&mut self, locked: bool) {
        if self.locked != locked {
            self.locked = locked;
            self.revision += 1;
        }
    }

    fn begin_edit(&mut self) -> Result<(), SchemaEditError> {
        if self.locked {
            return Err(SchemaEditError::Locked);
        }
        self.revision += 1;
        Ok(())
    }

    pub fn add_field(&mut self) -> Result<FormField, SchemaEditError> {
        self.begin_edit()?;
        Ok(self.schema.add_field().clone())
    }

    pub fn update_field(&mut self, id: &str, changes: FieldChanges) -> Result<bool, SchemaEditError> {
        self.begin_edit()?;
        Ok(self.schema.update_field(id, changes))
    }

    pub fn set_field_value(&mut self, id: &str, value: impl Into<String>) -> Result<bool, SchemaEditError> {
        self.update_field(id, FieldChanges::value(value))
    }

    pub fn delete_field(&mut self, id: &str) -> Result<bool, SchemaEditError> {
        self.begin_edit()?;
        Ok(self.schema.delete_field(id))
    }

    pub fn reorder(&mut self, dragged_id: &str, target_id: &str) -> Result<bool, SchemaEditError> {
        self.begin_edit()?;
        Ok(self.schema.reorder(dragged_id, target_id))
    }

    pub fn reset_to_default(&mut self) -> Result<(), SchemaEditError> {
        self.begin_edit()?;
        self.schema = FormSchema::default_form();
        Ok(())
    }

    pub fn apply_tool_value(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        let applied = self.schema.set_value_by_name(name, value);
        if applied.is_some() {
            self.revision += 1;
        }
        applied
    }
}
