/*!
 * Legacy rewritten URLs.
 *
 * The legacy `reecriture` table stores one row per URL with the page kind
 * (`fond`) and its query string (`param`, e.g. `id_produit=12&foo=bar`).
 */

use log::debug;

use crate::correspondence::EntityFamily;
use crate::errors::ImportError;
use crate::import::ImportContext;
use crate::source::{SourceQuery, SourceRow};
use crate::target::{RewriteRule, TargetCommand};

pub(crate) const REWRITE_TABLE: &str = "reecriture";

/// Target view and correspondence family of a legacy page kind
pub fn view_for_fond(fond: &str) -> Option<(&'static str, EntityFamily)> {
    match fond {
        "rubrique" => Some(("category", EntityFamily::Categories)),
        "produit" => Some(("product", EntityFamily::Products)),
        "contenu" => Some(("content", EntityFamily::Contents)),
        "dossier" => Some(("folder", EntityFamily::Folders)),
        _ => None,
    }
}

/// Legacy id named by `id_<fond>` in a rewrite query string
pub fn legacy_view_id(param: &str, fond: &str) -> Option<i64> {
    let key = format!("id_{}", fond);
    url::form_urlencoded::parse(param.trim_start_matches('?').as_bytes())
        .find(|(name, _)| *name == key)
        .and_then(|(_, value)| value.trim().parse().ok())
}

/// What registering a rewrite did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteRegistration {
    /// The URL was already known to the target
    AlreadyRegistered,
    /// First URL of its view; the new rule is canonical
    Canonical(i64),
    /// The view already had a canonical URL; the new rule redirects to it
    Redirect { id: i64, canonical: i64 },
}

/// Register a URL for a target view, redirecting to an existing canonical rule
pub async fn register_rewrite(
    context: &ImportContext,
    url: &str,
    view: &str,
    view_id: i64,
    locale: &str,
) -> Result<RewriteRegistration, ImportError> {
    if context.target.find_rewrite_by_url(url).await?.is_some() {
        return Ok(RewriteRegistration::AlreadyRegistered);
    }

    let canonical = context
        .target
        .find_default_rewrite(view, view_id, locale)
        .await?;

    let rule = RewriteRule {
        url: url.to_string(),
        view: view.to_string(),
        view_id,
        view_locale: locale.to_string(),
        redirected: canonical,
    };
    let id = context
        .target
        .create(TargetCommand::RegisterRewrite(rule))
        .await?;

    Ok(match canonical {
        Some(canonical) => RewriteRegistration::Redirect { id, canonical },
        None => RewriteRegistration::Canonical(id),
    })
}

/// Active legacy URL of one record in one language
pub async fn find_legacy_url(
    context: &ImportContext,
    fond: &str,
    legacy_id: i64,
    lang_id: i64,
) -> Result<Option<String>, ImportError> {
    let query = SourceQuery::table(REWRITE_TABLE)
        .filter("fond", fond)
        .filter("lang", lang_id)
        .filter("actif", 1i64)
        .filter_like("param", &format!("%id_{}={}%", fond, legacy_id))
        .order_by("id");

    let rows: Vec<SourceRow> = context.source.fetch(&query).await?;

    // LIKE also matches id_produit=12 for 1; keep exact matches only
    Ok(rows.into_iter().find_map(|row| {
        let param = row.get_opt_string("param")?;
        if legacy_view_id(&param, fond) == Some(legacy_id) {
            row.get_opt_string("url")
        } else {
            None
        }
    }))
}

/// Carry a freshly created record's legacy URL over to the target
pub async fn migrate_record_url(
    context: &ImportContext,
    fond: &str,
    legacy_id: i64,
    lang_id: i64,
    view_id: i64,
    locale: &str,
) -> Result<(), ImportError> {
    let Some(url) = find_legacy_url(context, fond, legacy_id, lang_id).await? else {
        debug!("No legacy URL for {} {}", fond, legacy_id);
        return Ok(());
    };
    let Some((view, _)) = view_for_fond(fond) else {
        return Ok(());
    };

    let registration = register_rewrite(context, &url, view, view_id, locale).await?;
    debug!("Legacy URL '{}' for {} {}: {:?}", url, fond, legacy_id, registration);
    Ok(())
}
