use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::clock::epoch_millis;

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Entrada,
    Salida,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Entrada => "entrada",
            MovementKind::Salida => "salida",
        }
    }
}

/// One entry of the movement log. Immutable once appended; `id` is its identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    #[serde(default = "epoch_millis", deserialize_with = "id_or_now")]
    pub id: i64,
    #[serde(default)]
    pub producto: String,
    #[serde(default)]
    pub cantidad: f64,
    /// `None` when the stored kind is missing or unrecognised; written back as absent.
    #[serde(default, deserialize_with = "lenient_kind", skip_serializing_if = "Option::is_none")]
    pub tipo: Option<MovementKind>,
    #[serde(default)]
    pub sede: String,
    #[serde(default)]
    pub descripcion: String,
    #[serde(default)]
    pub fecha: String,
    #[serde(default)]
    pub mes: i64,
    #[serde(default)]
    pub mes_nombre: String,
    #[serde(default)]
    pub stock_restante: f64,
}

// Null and absent ids both become the current time.
fn id_or_now<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(d)?.unwrap_or_else(epoch_millis))
}

fn lenient_kind<'de, D: Deserializer<'de>>(d: D) -> Result<Option<MovementKind>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(d)?;
    Ok(raw.and_then(|v| match serde_json::from_value(v.clone()) {
        Ok(kind) => Some(kind),
        Err(_) => {
            tracing::warn!(tipo = %v, "unrecognised movement kind");
            None
        }
    }))
}

/// Running totals of inbound and outbound movements.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counters {
    #[serde(default)]
    pub entradas: i64,
    #[serde(default)]
    pub salidas: i64,
}

/// Product key -> quantity/state. The value shape belongs to the domain layer.
pub type Inventory = BTreeMap<String, serde_json::Value>;

/// The whole synchronized dataset. Owned by [`SharedDataset`](crate::state::SharedDataset);
/// the sync core only reads it or replaces it wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    #[serde(default)]
    pub inventory: Inventory,
    #[serde(default)]
    pub counters: Counters,
    #[serde(default)]
    pub history: Vec<Movement>,
}
