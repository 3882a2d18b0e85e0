/*
 * Created on Tue Sep 08 2026
 *
 * This file is a part of crdb-harness
 * crdb-harness is an experiment harness that benchmarks a baseline and a
 * modified ("thesis") build of CockroachDB under YCSB and TPC-C workloads
 * and compares the two builds statistically.
 *
 * Copyright (c) 2026, the crdb-harness authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    crate::{
        config::{Deployment, HarnessConfig, Variant},
        docker::{ContainerRuntime, ContainerSpec, ImageBuild},
        HarnessResult,
    },
    std::collections::BTreeMap,
};

/// The name of the database binary a variant's image is built around
pub fn binary_name(variant: Variant) -> String {
    format!("cockroach-{variant}")
}

pub fn image_build(cfg: &HarnessConfig, variant: Variant) -> ImageBuild {
    ImageBuild {
        dockerfile: cfg.dockerfile.clone(),
        context: cfg.build_context.clone(),
        tag: cfg.image_tag(variant),
        build_args: vec![("BIN_NAME".to_owned(), binary_name(variant))],
    }
}

/// Build the image of every variant, pushing them to the registry for remote
/// deployments. Returns the image reference to run for each variant
pub fn build_images(
    runtime: &dyn ContainerRuntime,
    cfg: &HarnessConfig,
    deployment: Deployment,
) -> HarnessResult<BTreeMap<Variant, String>> {
    let mut images = BTreeMap::new();
    for variant in Variant::ALL {
        let build = image_build(cfg, variant);
        runtime.build_image(&build)?;
        let image = match deployment {
            Deployment::Local => build.tag,
            Deployment::Remote => {
                let remote = cfg.remote_image(variant)?;
                runtime.tag_image(&build.tag, &remote)?;
                runtime.push_image(&remote)?;
                remote
            }
        };
        info!("Image for {variant} is `{image}`");
        images.insert(variant, image);
    }
    Ok(images)
}

/// Build the toolchain image, then run it interactively to compile the database
/// binaries from the source tree
pub fn build_binaries(runtime: &dyn ContainerRuntime, cfg: &HarnessConfig) -> HarnessResult<()> {
    runtime.build_image(&ImageBuild {
        dockerfile: cfg.toolchain_dockerfile.clone(),
        context: cfg.build_context.clone(),
        tag: cfg.toolchain_image.clone(),
        build_args: Vec::new(),
    })?;
    info!("Compiling binaries in `{}` ...", cfg.toolchain_image);
    let source = format!("{}/", cfg.build_context.display());
    runtime.run(
        &ContainerSpec::new(&cfg.toolchain_image)
            .remove_on_exit()
            .interactive()
            .volume(source, "/app", None)
            .workdir("/app/cockroach")
            .volume("bzlhome", "/home/roach", Some("delegated"))
            .user("1000:1000"),
    )
}
