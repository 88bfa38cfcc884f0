use bson::{Bson, Document};
use indexmap::IndexMap;
use std::cmp::Ordering;

use crate::common::{
    add_numbers, as_f64, compare_values, get_field, is_number, remove_field, set_field, type_name,
    SortOrder, SortableFields, ACC_AVG, ACC_COUNT, ACC_FIRST, ACC_LAST, ACC_MAX, ACC_MIN,
    ACC_PUSH, ACC_SUM, DOC_ID, FIELD_REF_PREFIX, STAGE_GROUP, STAGE_LIMIT, STAGE_MATCH,
    STAGE_PROJECT, STAGE_SKIP, STAGE_SORT,
};
use crate::errors::{ErrorKind, VellumError, VellumResult};

use super::matcher::matches;

/// Runs the stages over `documents`, in the order given.
pub(crate) fn run_pipeline(
    mut documents: Vec<Document>,
    pipeline: &[Document],
) -> VellumResult<Vec<Document>> {
    for (position, stage) in pipeline.iter().enumerate() {
        let mut entries = stage.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                log::error!("Pipeline stage {} must have exactly one key: {}", position, stage);
                return Err(VellumError::new(
                    &format!("Pipeline stage {} must have exactly one key", position),
                    ErrorKind::InvalidOperation,
                ));
            }
        };

        documents = match name.as_str() {
            STAGE_MATCH => {
                let filter = stage_document(name, spec)?;
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if matches(&document, filter)? {
                        kept.push(document);
                    }
                }
                kept
            }
            STAGE_PROJECT => {
                let projection = Projection::parse(stage_document(name, spec)?)?;
                documents
                    .iter()
                    .map(|document| projection.apply(document))
                    .collect::<VellumResult<Vec<_>>>()?
            }
            STAGE_GROUP => group(documents, stage_document(name, spec)?)?,
            STAGE_SORT => {
                let fields = sort_spec(stage_document(name, spec)?)?;
                sort_documents(&mut documents, &fields);
                documents
            }
            STAGE_SKIP => {
                let count = stage_count(name, spec)?;
                documents.into_iter().skip(count).collect()
            }
            STAGE_LIMIT => {
                let count = stage_count(name, spec)?;
                if count == 0 {
                    return Err(VellumError::new(
                        "$limit must be positive",
                        ErrorKind::InvalidOperand,
                    ));
                }
                documents.truncate(count);
                documents
            }
            other => {
                log::error!("Unsupported pipeline stage {}", other);
                return Err(VellumError::new(
                    &format!("Unsupported pipeline stage {}", other),
                    ErrorKind::InvalidOperation,
                ));
            }
        };
    }
    Ok(documents)
}

/// Sorts documents by the given keys. Missing fields sort as null; ties keep
/// their incoming order.
pub(crate) fn sort_documents(documents: &mut [Document], fields: &SortableFields) {
    if fields.is_empty() {
        return;
    }
    documents.sort_by(|left, right| {
        for (field, order) in fields.sorting_order() {
            let l = get_field(left, field).unwrap_or(Bson::Null);
            let r = get_field(right, field).unwrap_or(Bson::Null);
            let ordering = match order {
                SortOrder::Ascending => compare_values(&l, &r),
                SortOrder::Descending => compare_values(&r, &l),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn stage_document<'a>(name: &str, spec: &'a Bson) -> VellumResult<&'a Document> {
    match spec {
        Bson::Document(document) => Ok(document),
        other => {
            log::error!("{} expects a document, found {}", name, type_name(other));
            Err(VellumError::new(
                &format!("{} expects a document, found {}", name, type_name(other)),
                ErrorKind::InvalidOperand,
            ))
        }
    }
}

fn stage_count(name: &str, spec: &Bson) -> VellumResult<usize> {
    let count = match spec {
        Bson::Int32(v) => *v as i64,
        Bson::Int64(v) => *v,
        Bson::Double(v) if v.fract() == 0.0 => *v as i64,
        _ => -1,
    };
    if count < 0 {
        log::error!("{} expects a non-negative integer, found {}", name, spec);
        return Err(VellumError::new(
            &format!("{} expects a non-negative integer", name),
            ErrorKind::InvalidOperand,
        ));
    }
    Ok(count as usize)
}

fn sort_spec(spec: &Document) -> VellumResult<SortableFields> {
    if spec.is_empty() {
        return Err(VellumError::new(
            "$sort requires at least one field",
            ErrorKind::InvalidOperand,
        ));
    }
    let mut fields = SortableFields::new();
    for (field, direction) in spec {
        let order = SortOrder::from_bson(direction).ok_or_else(|| {
            log::error!("Invalid sort direction {} for field {}", direction, field);
            VellumError::new(
                &format!("Invalid sort direction for field {}, expected 1 or -1", field),
                ErrorKind::InvalidOperand,
            )
        })?;
        fields = fields.add_sorted_field(field, order);
    }
    Ok(fields)
}

/// Evaluates an expression: `"$path"` reads a field, documents evaluate each
/// value, anything else is a literal.
fn evaluate(document: &Document, expression: &Bson) -> Option<Bson> {
    match expression {
        Bson::String(text) if text.starts_with(FIELD_REF_PREFIX) => {
            get_field(document, &text[FIELD_REF_PREFIX.len_utf8()..])
        }
        Bson::Document(inner) => {
            let mut evaluated = Document::new();
            for (key, value) in inner {
                evaluated.insert(key.clone(), evaluate(document, value).unwrap_or(Bson::Null));
            }
            Some(Bson::Document(evaluated))
        }
        literal => Some(literal.clone()),
    }
}

enum ProjectField {
    Include,
    Exclude,
    Compute(Bson),
}

struct Projection {
    fields: Vec<(String, ProjectField)>,
    exclusion: bool,
    drop_id: bool,
}

impl Projection {
    fn parse(spec: &Document) -> VellumResult<Projection> {
        let mut fields = Vec::with_capacity(spec.len());
        let mut drop_id = false;
        let (mut includes, mut excludes) = (0usize, 0usize);

        for (field, value) in spec {
            let action = match value {
                Bson::Boolean(flag) => flag_field(*flag),
                v if is_number(v) => flag_field(as_f64(v).unwrap_or(0.0) != 0.0),
                other => ProjectField::Compute(other.clone()),
            };

            if field == DOC_ID {
                match action {
                    ProjectField::Exclude => drop_id = true,
                    ProjectField::Compute(_) => fields.push((field.clone(), action)),
                    ProjectField::Include => {}
                }
                continue;
            }
            match action {
                ProjectField::Exclude => excludes += 1,
                _ => includes += 1,
            }
            fields.push((field.clone(), action));
        }

        if includes > 0 && excludes > 0 {
            log::error!("$project mixes inclusion and exclusion: {}", spec);
            return Err(VellumError::new(
                "$project cannot mix inclusion and exclusion",
                ErrorKind::InvalidOperation,
            ));
        }

        Ok(Projection {
            fields,
            exclusion: excludes > 0 || (includes == 0 && drop_id),
            drop_id,
        })
    }

    fn apply(&self, document: &Document) -> VellumResult<Document> {
        if self.exclusion {
            let mut projected = document.clone();
            for (field, _) in &self.fields {
                remove_field(&mut projected, field);
            }
            if self.drop_id {
                projected.remove(DOC_ID);
            }
            return Ok(projected);
        }

        let mut projected = Document::new();
        if !self.drop_id {
            if let Some(id) = document.get(DOC_ID) {
                projected.insert(DOC_ID, id.clone());
            }
        }
        for (field, action) in &self.fields {
            let value = match action {
                ProjectField::Include => get_field(document, field),
                ProjectField::Compute(expression) => evaluate(document, expression),
                ProjectField::Exclude => None,
            };
            if let Some(value) = value {
                set_field(&mut projected, field, value)?;
            }
        }
        Ok(projected)
    }
}

fn flag_field(flag: bool) -> ProjectField {
    if flag {
        ProjectField::Include
    } else {
        ProjectField::Exclude
    }
}

fn group(documents: Vec<Document>, spec: &Document) -> VellumResult<Vec<Document>> {
    let Some(key_expression) = spec.get(DOC_ID) else {
        log::error!("$group requires an {} expression: {}", DOC_ID, spec);
        return Err(VellumError::new(
            &format!("$group requires an {} expression", DOC_ID),
            ErrorKind::InvalidOperation,
        ));
    };

    let mut accumulators = Vec::new();
    for (field, definition) in spec.iter().filter(|(field, _)| field.as_str() != DOC_ID) {
        accumulators.push((field.clone(), Accumulator::parse(field, definition)?));
    }

    // keyed by the debug form of the normalized key; numbers that compare
    // equal share a group, other types never merge
    let mut groups: IndexMap<String, (Bson, Vec<Document>)> = IndexMap::new();
    for document in documents {
        let key = evaluate(&document, key_expression).unwrap_or(Bson::Null);
        groups
            .entry(format!("{:?}", group_key(&key)))
            .or_insert_with(|| (key, Vec::new()))
            .1
            .push(document);
    }

    let mut results = Vec::with_capacity(groups.len());
    for (_, (key, members)) in groups {
        let mut result = Document::new();
        result.insert(DOC_ID, key);
        for (field, accumulator) in &accumulators {
            result.insert(field.clone(), accumulator.accumulate(&members)?);
        }
        results.push(result);
    }
    Ok(results)
}

/// Rewrites integral numbers as `Int64` at any depth, so that `1`, `1i64`
/// and `1.0` produce the same group key.
fn group_key(value: &Bson) -> Bson {
    match value {
        Bson::Int32(n) => Bson::Int64(i64::from(*n)),
        Bson::Double(d) if d.fract() == 0.0 && d.abs() < i64::MAX as f64 => {
            Bson::Int64(*d as i64)
        }
        Bson::Array(items) => Bson::Array(items.iter().map(group_key).collect()),
        Bson::Document(fields) => Bson::Document(
            fields
                .iter()
                .map(|(field, value)| (field.clone(), group_key(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

struct Accumulator {
    operator: String,
    expression: Bson,
}

impl Accumulator {
    fn parse(field: &str, definition: &Bson) -> VellumResult<Accumulator> {
        let invalid = || {
            log::error!("Invalid accumulator for {}: {}", field, definition);
            VellumError::new(
                &format!("Accumulator for {} must be a single-operator document", field),
                ErrorKind::InvalidOperation,
            )
        };

        let Bson::Document(inner) = definition else {
            return Err(invalid());
        };
        let mut entries = inner.iter();
        match (entries.next(), entries.next()) {
            (Some((operator, expression)), None) => match operator.as_str() {
                ACC_SUM | ACC_AVG | ACC_MIN | ACC_MAX | ACC_FIRST | ACC_LAST | ACC_PUSH
                | ACC_COUNT => Ok(Accumulator {
                    operator: operator.clone(),
                    expression: expression.clone(),
                }),
                other => {
                    log::error!("Unsupported accumulator {}", other);
                    Err(VellumError::new(
                        &format!("Unsupported accumulator {}", other),
                        ErrorKind::InvalidOperation,
                    ))
                }
            },
            _ => Err(invalid()),
        }
    }

    fn accumulate(&self, members: &[Document]) -> VellumResult<Bson> {
        let values = || members.iter().filter_map(|member| evaluate(member, &self.expression));

        let result = match self.operator.as_str() {
            ACC_SUM => values()
                .filter(is_number)
                .fold(Bson::Int32(0), |total, value| {
                    add_numbers(&total, &value).unwrap_or(total)
                }),
            ACC_AVG => {
                let numbers: Vec<f64> = values().filter_map(|v| as_f64(&v)).collect();
                if numbers.is_empty() {
                    Bson::Null
                } else {
                    Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            ACC_MIN => values()
                .filter(|v| !matches!(v, Bson::Null))
                .min_by(compare_values)
                .unwrap_or(Bson::Null),
            ACC_MAX => values()
                .filter(|v| !matches!(v, Bson::Null))
                .max_by(compare_values)
                .unwrap_or(Bson::Null),
            ACC_FIRST => members
                .first()
                .and_then(|member| evaluate(member, &self.expression))
                .unwrap_or(Bson::Null),
            ACC_LAST => members
                .last()
                .and_then(|member| evaluate(member, &self.expression))
                .unwrap_or(Bson::Null),
            ACC_PUSH => Bson::Array(values().collect()),
            ACC_COUNT => Bson::Int64(members.len() as i64),
            other => {
                return Err(VellumError::new(
                    &format!("Unsupported accumulator {}", other),
                    ErrorKind::InvalidOperation,
                ))
            }
        };
        Ok(result)
    }
}
